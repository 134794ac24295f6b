use std::time::Duration;
use tracing::{debug, error, info};

use crate::core::error::{MutationKind, SyncError};
use crate::models::frame::{Command, Inbound};
use crate::models::user::UserRecord;
use crate::session::transport::Transport;

/// Sends add/remove commands one at a time.
///
/// Each command waits for its `result` frame before the next one goes out;
/// the controller answers strictly in order and its replies carry no request
/// id. A rejected command ends the run.
pub struct MutationSequencer<'a, T: Transport> {
    transport: &'a mut T,
    command_interval: Duration,
    response_timeout: Duration,
    issued: usize,
}

impl<'a, T: Transport> MutationSequencer<'a, T> {
    pub fn new(transport: &'a mut T, command_interval: Duration, response_timeout: Duration) -> Self {
        Self {
            transport,
            command_interval,
            response_timeout,
            issued: 0,
        }
    }

    /// Number of commands acknowledged so far
    pub fn issued(&self) -> usize {
        self.issued
    }

    /// Remove every record in `queue` from the controller
    pub async fn remove_all(&mut self, queue: Vec<UserRecord>) -> Result<usize, SyncError> {
        self.drain(MutationKind::Remove, queue).await
    }

    /// Write every record in `queue` to the controller
    pub async fn add_all(&mut self, queue: Vec<UserRecord>) -> Result<usize, SyncError> {
        self.drain(MutationKind::Add, queue).await
    }

    async fn drain(&mut self, kind: MutationKind, mut queue: Vec<UserRecord>) -> Result<usize, SyncError> {
        let total = queue.len();
        let mut done = 0;

        while let Some(user) = queue.pop() {
            // Pace every command after the first one of the session
            if self.issued > 0 {
                tokio::time::sleep(self.command_interval).await;
            }

            let command = match kind {
                MutationKind::Remove => Command::remove(&user),
                MutationKind::Add => Command::add(&user),
            };
            self.transport.send(&command).await?;

            if !self.await_result(kind, &user).await? {
                error!(
                    command = %kind,
                    uid = %user.external_id,
                    user = %user.display_name,
                    "Controller rejected command"
                );
                return Err(SyncError::MutationRejected {
                    kind,
                    uid: user.external_id,
                });
            }

            self.issued += 1;
            done += 1;
            info!(
                command = %kind,
                uid = %user.external_id,
                progress = %format!("{}/{}", done, total),
                "Command acknowledged"
            );
        }

        Ok(done)
    }

    /// Wait for the `result` frame answering `kind`, skipping everything else.
    /// Returns whether the controller accepted the command.
    async fn await_result(&mut self, kind: MutationKind, user: &UserRecord) -> Result<bool, SyncError> {
        let transport = &mut *self.transport;
        let wait = async {
            loop {
                match transport.recv().await {
                    Ok(Inbound::Result(result)) if result.result_of == kind.as_str() => {
                        return Ok(result.accepted)
                    }
                    Ok(other) => debug!(
                        kind = %other.kind(),
                        awaiting = %kind,
                        "Ignoring frame while awaiting acknowledgment"
                    ),
                    Err(e) => return Err(SyncError::from(e)),
                }
            }
        };

        tokio::time::timeout(self.response_timeout, wait)
            .await
            .map_err(|_| SyncError::Timeout {
                waiting_for: format!("{} result for uid {}", kind, user.external_id),
                after: self.response_timeout,
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ConnectionError;
    use crate::models::user::AccessLevel;
    use crate::session::scripted::{result, ScriptedTransport};

    fn user(uid: &str) -> UserRecord {
        UserRecord::new(uid, format!("1: {}", uid), AccessLevel::Always, 4200000000, "1234")
    }

    fn sequencer(transport: &mut ScriptedTransport) -> MutationSequencer<'_, ScriptedTransport> {
        MutationSequencer::new(transport, Duration::ZERO, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_removes_each_record_once() {
        let mut transport = ScriptedTransport::with_verdicts(vec![]);

        let removed = sequencer(&mut transport)
            .remove_all(vec![user("a"), user("b"), user("c")])
            .await
            .unwrap();

        assert_eq!(removed, 3);
        assert_eq!(transport.sent_kinds(), vec!["remove", "remove", "remove"]);
        let mut uids: Vec<String> = transport
            .sent
            .iter()
            .filter_map(|c| match c {
                Command::Remove { uid } => Some(uid.clone()),
                _ => None,
            })
            .collect();
        uids.sort();
        assert_eq!(uids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_rejection_stops_the_queue() {
        let mut transport = ScriptedTransport::with_verdicts(vec![true, false, true]);

        let err = sequencer(&mut transport)
            .remove_all(vec![user("a"), user("b"), user("c")])
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::MutationRejected { kind: MutationKind::Remove, .. }));
        assert_eq!(transport.sent.len(), 2, "third command must never be sent");
    }

    #[tokio::test]
    async fn test_rejection_names_the_record() {
        let mut transport = ScriptedTransport::with_verdicts(vec![false]);

        let err = sequencer(&mut transport).add_all(vec![user("a1")]).await.unwrap_err();

        match err {
            SyncError::MutationRejected { kind, uid } => {
                assert_eq!(kind, MutationKind::Add);
                assert_eq!(uid, "a1");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_waits_for_matching_result() {
        // A stray result for another command kind must not acknowledge the add
        let mut transport = ScriptedTransport::new(|command| match command {
            Command::Userfile { .. } => vec![
                Inbound::Other("status".to_string()),
                result("remove", false),
                result("userfile", true),
            ],
            _ => vec![],
        });

        let added = sequencer(&mut transport).add_all(vec![user("a")]).await.unwrap();
        assert_eq!(added, 1);
    }

    #[tokio::test]
    async fn test_one_command_in_flight() {
        struct Strict {
            outstanding: Option<MutationKind>,
            sent: usize,
        }

        impl Transport for Strict {
            async fn send(&mut self, command: &Command) -> Result<(), ConnectionError> {
                assert!(self.outstanding.is_none(), "command sent before previous acknowledgment");
                self.outstanding = command.mutation_kind();
                self.sent += 1;
                Ok(())
            }

            async fn recv(&mut self) -> Result<Inbound, ConnectionError> {
                let kind = self.outstanding.take().expect("waiting without a command in flight");
                Ok(result(kind.as_str(), true))
            }
        }

        let mut transport = Strict { outstanding: None, sent: 0 };
        let mut seq = MutationSequencer::new(&mut transport, Duration::ZERO, Duration::from_secs(1));
        seq.remove_all(vec![user("a"), user("b")]).await.unwrap();
        seq.add_all(vec![user("c"), user("d"), user("e")]).await.unwrap();
        assert_eq!(seq.issued(), 5);
        assert_eq!(transport.sent, 5);
    }

    #[tokio::test]
    async fn test_missing_acknowledgment_times_out() {
        let mut transport = ScriptedTransport::new(|_| vec![]);

        let err = MutationSequencer::new(&mut transport, Duration::ZERO, Duration::from_millis(20))
            .remove_all(vec![user("a"), user("b")])
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Timeout { .. }), "got {:?}", err);
        assert_eq!(transport.sent.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_queue_sends_nothing() {
        let mut transport = ScriptedTransport::with_verdicts(vec![]);
        let done = sequencer(&mut transport).add_all(vec![]).await.unwrap();
        assert_eq!(done, 0);
        assert!(transport.sent.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_connection_is_connection_error() {
        struct Dropped;

        impl Transport for Dropped {
            async fn send(&mut self, _command: &Command) -> Result<(), ConnectionError> {
                Ok(())
            }

            async fn recv(&mut self) -> Result<Inbound, ConnectionError> {
                Err(ConnectionError::Closed)
            }
        }

        let mut transport = Dropped;
        let err = MutationSequencer::new(&mut transport, Duration::ZERO, Duration::from_secs(1))
            .remove_all(vec![user("a")])
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Connection(ConnectionError::Closed)));
    }
}
