// In-memory controller stand-in for reader and sequencer tests

use std::collections::VecDeque;

use crate::core::error::ConnectionError;
use crate::models::frame::{Command, Inbound, MutationResult, UserListPage};
use crate::models::user::UserRecord;
use crate::session::transport::Transport;

type Responder = Box<dyn FnMut(&Command) -> Vec<Inbound>>;

/// Records every sent command and answers with whatever the responder
/// returns for it. When nothing is queued, `recv` never completes, which
/// is how a silent controller looks from the outside.
pub(crate) struct ScriptedTransport {
    pub sent: Vec<Command>,
    pending: VecDeque<Inbound>,
    responder: Responder,
}

impl ScriptedTransport {
    pub fn new(responder: impl FnMut(&Command) -> Vec<Inbound> + 'static) -> Self {
        Self {
            sent: Vec::new(),
            pending: VecDeque::new(),
            responder: Box::new(responder),
        }
    }

    /// Serve `pages` in order, one per list request
    pub fn with_pages(pages: Vec<Vec<UserRecord>>) -> Self {
        let total = pages.len() as u32;
        Self::new(move |command| match command {
            Command::Userlist { page } => {
                let list = pages.get(*page as usize - 1).cloned().unwrap_or_default();
                vec![Inbound::UserList(UserListPage { page: *page, total_pages: total, list })]
            }
            _ => vec![],
        })
    }

    /// Acknowledge mutations with the given verdicts, in order; once
    /// exhausted every further mutation is accepted
    pub fn with_verdicts(verdicts: Vec<bool>) -> Self {
        let mut verdicts = VecDeque::from(verdicts);
        Self::new(move |command| match command.mutation_kind() {
            Some(kind) => vec![result(kind.as_str(), verdicts.pop_front().unwrap_or(true))],
            None => vec![],
        })
    }

    pub fn sent_kinds(&self) -> Vec<&'static str> {
        self.sent
            .iter()
            .map(|command| match command {
                Command::Userlist { .. } => "userlist",
                Command::Remove { .. } => "remove",
                Command::Userfile { .. } => "userfile",
            })
            .collect()
    }
}

pub(crate) fn result(result_of: &str, accepted: bool) -> Inbound {
    Inbound::Result(MutationResult {
        result_of: result_of.to_string(),
        accepted,
    })
}

impl Transport for ScriptedTransport {
    async fn send(&mut self, command: &Command) -> Result<(), ConnectionError> {
        self.sent.push(command.clone());
        let replies = (self.responder)(command);
        self.pending.extend(replies);
        Ok(())
    }

    async fn recv(&mut self) -> Result<Inbound, ConnectionError> {
        match self.pending.pop_front() {
            Some(frame) => Ok(frame),
            None => std::future::pending().await,
        }
    }
}
