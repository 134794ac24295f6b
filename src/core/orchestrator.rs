// Per-controller sync run: read, diff, then remove and add

use tracing::{error, info, warn};

use crate::api::login::LoginClient;
use crate::core::config::{Config, ControllerConfig, SyncConfig};
use crate::core::error::{exit_code, SyncError};
use crate::models::user::DesiredUser;
use crate::reconcile::diff::{compute_diff, validate_unique_keys};
use crate::session::reader::DirectoryReader;
use crate::session::sequencer::MutationSequencer;
use crate::session::transport::{Transport, WsSession};

/// Outcome of one controller's run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerReport {
    pub controller: String,
    pub remote_users: usize,
    pub pages: u32,
    pub to_remove: Vec<String>,
    pub to_add: Vec<String>,
    pub removed: usize,
    pub added: usize,
}

impl ControllerReport {
    pub fn nothing_to_do(&self) -> bool {
        self.to_remove.is_empty() && self.to_add.is_empty()
    }
}

/// Outcome of a whole run across all controllers
#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<ControllerReport>,
    /// Controllers skipped after a login or connection failure
    pub failures: Vec<(String, SyncError)>,
}

impl RunSummary {
    /// Exit status for the run: the first controller failure, if any
    pub fn exit_code(&self) -> u8 {
        self.failures
            .first()
            .map(|(_, e)| e.exit_code())
            .unwrap_or(exit_code::SUCCESS)
    }
}

/// Drives one sync run over every configured controller
pub struct Orchestrator {
    controllers: Vec<ControllerConfig>,
    sync: SyncConfig,
    login: LoginClient,
    dry_run: bool,
}

impl Orchestrator {
    pub fn new(config: &Config, dry_run: bool) -> Result<Self, SyncError> {
        Ok(Self {
            controllers: config.controllers.clone(),
            sync: config.sync.clone(),
            login: LoginClient::new(config.sync.login_timeout())?,
            dry_run,
        })
    }

    /// Sync every controller in turn.
    ///
    /// Login and connection failures skip to the next controller and are
    /// collected in the summary. A rejected mutation or a timeout stops the
    /// run and is returned as the error.
    pub async fn run(&self, desired: &[DesiredUser]) -> Result<RunSummary, SyncError> {
        validate_unique_keys(desired)?;

        let mut summary = RunSummary::default();

        for controller in &self.controllers {
            info!(controller = %controller.label(), host = %controller.host, "Connecting to controller");

            match self.sync_controller(controller, desired).await {
                Ok(report) => summary.reports.push(report),
                Err(e) if e.is_controller_scoped() => {
                    error!(controller = %controller.label(), error = %e, "Skipping controller");
                    summary.failures.push((controller.label().to_string(), e));
                }
                Err(e) => {
                    // The caller reports the error itself
                    error!(controller = %controller.label(), "Aborting run");
                    return Err(e);
                }
            }
        }

        info!(
            synced = summary.reports.len(),
            failed = summary.failures.len(),
            "Run complete"
        );

        Ok(summary)
    }

    async fn sync_controller(
        &self,
        controller: &ControllerConfig,
        desired: &[DesiredUser],
    ) -> Result<ControllerReport, SyncError> {
        let auth = self.login.login(controller).await?;
        info!(controller = %controller.label(), "Logged in");

        let mut session =
            WsSession::connect(&auth, &controller.socket_url(), self.sync.response_timeout()).await?;
        info!(controller = %controller.label(), url = %session.url(), "Connected to controller socket");

        tokio::time::sleep(self.sync.connect_settle()).await;

        let result =
            reconcile_session(&mut session, controller.label(), desired, &self.sync, self.dry_run).await;
        session.close().await;
        result
    }
}

/// Bring one connected controller in line with `desired`.
///
/// The full remote list is read before anything is decided. All removals
/// finish before the first addition, so a key that is being rewritten never
/// exists twice on the controller.
pub async fn reconcile_session<T: Transport>(
    transport: &mut T,
    label: &str,
    desired: &[DesiredUser],
    sync: &SyncConfig,
    dry_run: bool,
) -> Result<ControllerReport, SyncError> {
    let directory = DirectoryReader::new(&mut *transport, sync.page_interval(), sync.response_timeout())
        .read_all()
        .await?;

    let diff = compute_diff(desired, &directory.users);

    let mut report = ControllerReport {
        controller: label.to_string(),
        remote_users: directory.users.len(),
        pages: directory.pages_requested,
        to_remove: diff.extraneous.iter().map(|u| u.external_id.clone()).collect(),
        to_add: diff.missing.iter().map(|u| u.external_id.clone()).collect(),
        ..Default::default()
    };

    info!(
        controller = %label,
        remote_users = report.remote_users,
        pages = report.pages,
        to_remove = report.to_remove.len(),
        to_add = report.to_add.len(),
        "Computed difference"
    );

    if diff.is_empty() {
        info!(controller = %label, "Nothing to do");
        return Ok(report);
    }

    if dry_run {
        for user in &diff.extraneous {
            warn!(controller = %label, uid = %user.external_id, user = %user.display_name, "Would remove");
        }
        for user in &diff.missing {
            warn!(controller = %label, uid = %user.external_id, user = %user.display_name, "Would add");
        }
        return Ok(report);
    }

    let mut sequencer =
        MutationSequencer::new(&mut *transport, sync.command_interval(), sync.response_timeout());

    info!(controller = %label, count = diff.extraneous.len(), "Removing users");
    report.removed = sequencer.remove_all(diff.extraneous).await?;
    info!(controller = %label, removed = report.removed, "Done removing");

    info!(controller = %label, count = diff.missing.len(), "Adding users");
    report.added = sequencer.add_all(diff.missing).await?;
    info!(controller = %label, added = report.added, "Done adding");

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{InputError, MutationKind};
    use crate::models::frame::{Command, Inbound, UserListPage};
    use crate::models::user::{AccessLevel, UserRecord};
    use crate::session::scripted::{result, ScriptedTransport};

    const T: i64 = 4200000000;

    fn fast_sync() -> SyncConfig {
        SyncConfig {
            connect_settle_ms: 0,
            page_interval_ms: 0,
            command_interval_ms: 0,
            response_timeout_secs: 1,
            login_timeout_secs: 1,
        }
    }

    /// Controller holding `remote` on a single page that accepts every mutation
    fn controller(remote: Vec<UserRecord>) -> ScriptedTransport {
        ScriptedTransport::new(move |command| match command {
            Command::Userlist { page } => vec![Inbound::UserList(UserListPage {
                page: *page,
                total_pages: 1,
                list: remote.clone(),
            })],
            other => vec![result(other.mutation_kind().map(|k| k.as_str()).unwrap_or(""), true)],
        })
    }

    #[tokio::test]
    async fn test_new_user_is_added() {
        let desired = vec![UserRecord::new("a1", "Alice", AccessLevel::Always, T, "1234")];
        let mut transport = controller(vec![]);

        let report = reconcile_session(&mut transport, "door", &desired, &fast_sync(), false)
            .await
            .unwrap();

        assert_eq!(report.to_add, vec!["a1"]);
        assert!(report.to_remove.is_empty());
        assert_eq!(report.added, 1);
        assert_eq!(report.removed, 0);
        assert_eq!(transport.sent_kinds(), vec!["userlist", "userfile"]);
        assert_eq!(transport.sent[1], Command::add(&desired[0]));
    }

    #[tokio::test]
    async fn test_in_sync_controller_is_left_alone() {
        let desired = vec![UserRecord::new("a1", "Alice", AccessLevel::Always, T, "1234")];
        let mut transport = controller(desired.clone());

        let report = reconcile_session(&mut transport, "door", &desired, &fast_sync(), false)
            .await
            .unwrap();

        assert!(report.nothing_to_do());
        assert_eq!(transport.sent_kinds(), vec!["userlist"]);
    }

    #[tokio::test]
    async fn test_removals_precede_additions() {
        let desired = vec![
            UserRecord::new("a1", "Alice", AccessLevel::Always, T, "1234"),
            UserRecord::new("c3", "Carol", AccessLevel::Admin, T, "3333"),
        ];
        let remote = vec![
            UserRecord::new("a1", "Alice", AccessLevel::Always, T, "0000"),
            UserRecord::new("b2", "Bob", AccessLevel::Always, T, "2222"),
        ];
        let mut transport = controller(remote);

        let report = reconcile_session(&mut transport, "door", &desired, &fast_sync(), false)
            .await
            .unwrap();

        assert_eq!(report.removed, 2);
        assert_eq!(report.added, 2);
        assert_eq!(
            transport.sent_kinds(),
            vec!["userlist", "remove", "remove", "userfile", "userfile"]
        );
    }

    #[tokio::test]
    async fn test_dry_run_sends_no_mutations() {
        let desired = vec![UserRecord::new("a1", "Alice", AccessLevel::Always, T, "1234")];
        let remote = vec![UserRecord::new("b2", "Bob", AccessLevel::Always, T, "2222")];
        let mut transport = controller(remote);

        let report = reconcile_session(&mut transport, "door", &desired, &fast_sync(), true)
            .await
            .unwrap();

        assert_eq!(report.to_add, vec!["a1"]);
        assert_eq!(report.to_remove, vec!["b2"]);
        assert_eq!(report.added + report.removed, 0);
        assert_eq!(transport.sent_kinds(), vec!["userlist"]);
    }

    #[tokio::test]
    async fn test_rejected_removal_skips_additions() {
        let desired = vec![UserRecord::new("a1", "Alice", AccessLevel::Always, T, "1234")];
        let remote = vec![UserRecord::new("b2", "Bob", AccessLevel::Always, T, "2222")];
        let mut transport = ScriptedTransport::new(move |command| match command {
            Command::Userlist { page } => vec![Inbound::UserList(UserListPage {
                page: *page,
                total_pages: 1,
                list: remote.clone(),
            })],
            Command::Remove { .. } => vec![result("remove", false)],
            Command::Userfile { .. } => vec![result("userfile", true)],
        });

        let err = reconcile_session(&mut transport, "door", &desired, &fast_sync(), false)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::MutationRejected { kind: MutationKind::Remove, .. }));
        assert_eq!(transport.sent_kinds(), vec!["userlist", "remove"]);
    }

    #[tokio::test]
    async fn test_run_rejects_duplicate_roster() {
        let config: Config = toml::from_str(
            r#"
            [[controllers]]
            host = "127.0.0.1:9"
            username = "admin"
            password = "admin"
            "#,
        )
        .unwrap();
        let orchestrator = Orchestrator::new(&config, false).unwrap();
        let desired = vec![
            UserRecord::new("a1", "Alice", AccessLevel::Always, T, "1234"),
            UserRecord::new("a1", "Alice", AccessLevel::Always, T, "5678"),
        ];

        let err = orchestrator.run(&desired).await.unwrap_err();
        assert!(matches!(err, SyncError::Input(InputError::DuplicateKeys { .. })));
    }

    #[test]
    fn test_summary_exit_code() {
        let mut summary = RunSummary::default();
        assert_eq!(summary.exit_code(), exit_code::SUCCESS);

        summary.failures.push((
            "door".to_string(),
            SyncError::Connection(crate::core::error::ConnectionError::Closed),
        ));
        assert_eq!(summary.exit_code(), exit_code::CONNECTION);
    }
}
