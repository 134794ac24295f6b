use std::time::Duration;
use tracing::{debug, info, warn};

use crate::core::error::{ConnectionError, SyncError};
use crate::models::frame::{Command, Inbound, UserListPage};
use crate::models::user::ActualUser;
use crate::session::transport::Transport;

/// Upper bound on pages followed from one listing
const MAX_PAGES: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    AwaitingPage(u32),
    Complete,
}

/// Full user list read from a controller
#[derive(Debug, Clone)]
pub struct RemoteDirectory {
    pub users: Vec<ActualUser>,
    pub pages_requested: u32,
}

/// Reads a controller's complete user list, page by page
pub struct DirectoryReader<'a, T: Transport> {
    transport: &'a mut T,
    page_interval: Duration,
    response_timeout: Duration,
}

impl<'a, T: Transport> DirectoryReader<'a, T> {
    pub fn new(transport: &'a mut T, page_interval: Duration, response_timeout: Duration) -> Self {
        Self {
            transport,
            page_interval,
            response_timeout,
        }
    }

    /// Request page 1 and keep following `page + 1` until the controller
    /// reports the last page. Users are returned in arrival order.
    pub async fn read_all(mut self) -> Result<RemoteDirectory, SyncError> {
        let mut users = Vec::new();
        let mut pages_requested = 1;

        self.transport.send(&Command::list_page(1)).await?;
        let mut state = ReaderState::AwaitingPage(1);

        while let ReaderState::AwaitingPage(expected) = state {
            let page = self.next_page(expected).await?;

            if page.page != expected {
                warn!(expected, received = page.page, "Controller answered with a different page");
            }

            info!(
                page = page.page,
                total_pages = page.total_pages,
                users = page.list.len(),
                "Parsed user list page"
            );
            users.extend(page.list);

            state = if page.page < page.total_pages {
                let next = page.page + 1;
                if pages_requested >= MAX_PAGES {
                    return Err(ConnectionError::Protocol(format!(
                        "controller reports more than {} pages",
                        MAX_PAGES
                    ))
                    .into());
                }

                tokio::time::sleep(self.page_interval).await;
                self.transport.send(&Command::list_page(next)).await?;
                pages_requested += 1;
                ReaderState::AwaitingPage(next)
            } else {
                ReaderState::Complete
            };
        }

        Ok(RemoteDirectory {
            users,
            pages_requested,
        })
    }

    /// Wait for the next `userlist` frame, skipping everything else
    async fn next_page(&mut self, expected: u32) -> Result<UserListPage, SyncError> {
        let transport = &mut *self.transport;
        let wait = async {
            loop {
                match transport.recv().await {
                    Ok(Inbound::UserList(page)) => return Ok(page),
                    Ok(other) => debug!(kind = %other.kind(), "Ignoring frame while listing users"),
                    Err(e) => return Err(SyncError::from(e)),
                }
            }
        };

        tokio::time::timeout(self.response_timeout, wait)
            .await
            .map_err(|_| SyncError::Timeout {
                waiting_for: format!("user list page {}", expected),
                after: self.response_timeout,
            })?
    }
}
