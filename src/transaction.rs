//! Orchestrates one install/switch as a state machine: extract → backup →
//! promote → reconcile → commit, with rollback on a failed promote.
//!
//! The transition table is pure, the same `(State, Event) -> (State,
//! Vec<Effect>)` shape the extraction-pipeline's VM-provisioning ancestor
//! used for its boot flows — but collapsed to a synchronous driver loop
//! (no event loop, no channels) since this pipeline is single-threaded.

use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use crate::environment::Environment;
use crate::error::WslSwitchError;
use crate::extractor::{self, ExtractReport};
use crate::identity;
use crate::label;
use crate::xattr::XAttrGateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Prepared,
    Extracted,
    BackedUp,
    Switched,
    Reconciled,
    Committed,
    Aborted,
    RollingBack,
    Broken,
}

#[derive(Debug, Clone)]
pub enum Event {
    Start,
    ExtractOk,
    ExtractFailed(String),
    BackupOk,
    BackupFailed(String),
    PromoteOk,
    PromoteFailed(String),
    RollbackOk,
    RollbackFailed,
    LabelWritten,
    Reconciled,
    Done,
}

#[derive(Debug, Clone)]
pub enum Effect {
    Extract,
    Backup,
    Promote,
    Rollback,
    WriteLabel,
    Reconcile,
    Finish,
}

/// Pure transition function: never touches disk, only decides what to do
/// next. `transition(state, event) -> (state, effects)`; unknown
/// combinations leave the state unchanged with no effects.
pub fn transition(state: State, event: &Event) -> (State, Vec<Effect>) {
    use Event::*;
    use State::*;

    match (state, event) {
        (Prepared, Start) => (Prepared, vec![Effect::Extract]),
        (Prepared, ExtractOk) => (Extracted, vec![Effect::Backup]),
        (Prepared, ExtractFailed(_)) => (Aborted, vec![]),

        (Extracted, BackupOk) => (BackedUp, vec![Effect::Promote]),
        (Extracted, BackupFailed(_)) => (Aborted, vec![]),

        (BackedUp, PromoteOk) => (Switched, vec![Effect::WriteLabel]),
        (BackedUp, PromoteFailed(_)) => (RollingBack, vec![Effect::Rollback]),

        (RollingBack, RollbackOk) => (Aborted, vec![]),
        (RollingBack, RollbackFailed) => (Broken, vec![]),

        (Switched, LabelWritten) => (Reconciled, vec![Effect::Reconcile]),
        (Reconciled, Reconciled) => (Committed, vec![Effect::Finish]),
        (Committed, Done) => (Committed, vec![]),

        (s, _) => {
            warn!(?s, ?event, "unhandled transaction transition");
            (s, vec![])
        }
    }
}

/// Inputs threaded through one transaction run.
pub struct TransactionInputs<'a> {
    pub source: &'a Path,
    pub basedir: &'a Path,
    pub legacy_label: &'a str,
    pub promote_flush_delay: Duration,
    pub clear_root_shadow_on_missing_hash: bool,
    pub gateway: &'a dyn XAttrGateway,
    pub to_gateway_path: &'a dyn Fn(&Path) -> String,
    pub environment: &'a dyn Environment,
}

#[derive(Debug)]
pub struct TransactionOutcome {
    pub final_state: State,
    pub new_label: Option<String>,
    pub extract_report: Option<ExtractReport>,
}

/// Drives the transition table end to end against real (or faked)
/// collaborators, one effect at a time.
pub fn run(inputs: TransactionInputs<'_>) -> Result<TransactionOutcome, WslSwitchError> {
    let rootfs = inputs.basedir.join("rootfs");
    let staging = inputs.basedir.join("rootfs-temp");

    let mut state = State::Prepared;
    let mut extract_report = None;
    let mut new_label = None;

    let (next, effects) = transition(state, &Event::Start);
    state = next;
    debug_assert_eq!(effects.len(), 1);

    info!(source = %inputs.source.display(), "extracting rootfs");
    let extracted = extractor::extract(
        inputs.source,
        &staging,
        inputs.gateway,
        inputs.to_gateway_path,
    );
    let event = match extracted {
        Ok(report) if report.total > 0 && report.succeeded == 0 => {
            warn!(total = report.total, "every entry failed to extract");
            let (next, _) = transition(state, &Event::ExtractFailed("zero entries succeeded".to_string()));
            state = next;
            debug_assert_eq!(state, State::Aborted);
            return Err(WslSwitchError::ExtractionTotalFailure {
                path: inputs.source.display().to_string(),
                total: report.total,
            });
        }
        Ok(report) => {
            extract_report = Some(report);
            Event::ExtractOk
        }
        Err(e) => Event::ExtractFailed(e.to_string()),
    };
    let (next, _) = transition(state, &event);
    state = next;
    if state == State::Aborted {
        return Err(WslSwitchError::ArchiveOpenError {
            path: inputs.source.display().to_string(),
            message: format!("{:?}", event),
        });
    }

    let clabel = label::read(&rootfs, None)?.unwrap_or_else(|| inputs.legacy_label.to_string());
    let backup_path = inputs.basedir.join(format!("rootfs_{clabel}"));

    info!(label = %clabel, "backing up current rootfs");
    let backup_result = std::fs::rename(&rootfs, &backup_path);
    let event = match backup_result {
        Ok(()) => Event::BackupOk,
        Err(e) => Event::BackupFailed(e.to_string()),
    };
    let (next, _) = transition(state, &event);
    state = next;
    if state == State::Aborted {
        return Err(WslSwitchError::RenameError {
            src: rootfs.display().to_string(),
            dst: backup_path.display().to_string(),
            os_status: format!("{:?}", event),
        });
    }

    std::thread::sleep(inputs.promote_flush_delay);

    info!("promoting staged rootfs");
    let promote_result = std::fs::rename(&staging, &rootfs);
    let event = match promote_result {
        Ok(()) => Event::PromoteOk,
        Err(e) => Event::PromoteFailed(e.to_string()),
    };
    let (next, _) = transition(state, &event);
    state = next;

    if state == State::RollingBack {
        warn!("promote failed, rolling back");
        let rollback_result = std::fs::rename(&backup_path, &rootfs);
        let event = match rollback_result {
            Ok(()) => Event::RollbackOk,
            Err(_) => Event::RollbackFailed,
        };
        let (next, _) = transition(state, &event);
        state = next;
        if state == State::Broken {
            return Err(WslSwitchError::RollbackFailed);
        }
        return Err(WslSwitchError::RenameError {
            src: staging.display().to_string(),
            dst: rootfs.display().to_string(),
            os_status: "promote failed; rolled back".to_string(),
        });
    }

    let derived_label = label::read(&rootfs, None)?;
    let label_value = derived_label.unwrap_or_else(|| inputs.legacy_label.to_string());
    label::write(&rootfs, &label_value)?;
    new_label = Some(label_value);
    let (next, _) = transition(state, &Event::LabelWritten);
    state = next;

    info!("reconciling user identity");
    let user = inputs.environment.get_default_user()?;
    let identity = identity::capture(&backup_path, &user.name)?;
    identity::reconcile(
        &rootfs,
        &identity,
        &user.name,
        inputs.clear_root_shadow_on_missing_hash,
    )?;
    let (next, _) = transition(state, &Event::Reconciled);
    state = next;

    let (next, _) = transition(state, &Event::Done);
    state = next;

    Ok(TransactionOutcome {
        final_state: state,
        new_label,
        extract_report,
    })
}

/// A bare `rename(rootfs_<label>, rootfs)` for the `switch` command — no
/// extraction, no reconciliation, just the backup/promote/rollback dance
/// against an already-installed slot.
pub fn switch_to_label(basedir: &Path, current_label: &str, target_label: &str) -> Result<(), WslSwitchError> {
    let rootfs = basedir.join("rootfs");
    let target = basedir.join(format!("rootfs_{target_label}"));
    let backup = basedir.join(format!("rootfs_{current_label}"));

    if !target.is_dir() {
        return Err(WslSwitchError::NotInstalledSlot {
            image: target_label.to_string(),
            tag: String::new(),
        });
    }

    std::fs::rename(&rootfs, &backup).map_err(|e| WslSwitchError::RenameError {
        src: rootfs.display().to_string(),
        dst: backup.display().to_string(),
        os_status: e.to_string(),
    })?;

    if let Err(e) = std::fs::rename(&target, &rootfs) {
        let rollback = std::fs::rename(&backup, &rootfs);
        if rollback.is_err() {
            return Err(WslSwitchError::RollbackFailed);
        }
        return Err(WslSwitchError::RenameError {
            src: target.display().to_string(),
            dst: rootfs.display().to_string(),
            os_status: e.to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        let state = State::Prepared;
        let (state, effects) = transition(state, &Event::Start);
        assert_eq!(state, State::Prepared);
        assert_eq!(effects.len(), 1);

        let (state, effects) = transition(state, &Event::ExtractOk);
        assert_eq!(state, State::Extracted);
        assert!(matches!(effects[0], Effect::Backup));

        let (state, _) = transition(state, &Event::BackupOk);
        assert_eq!(state, State::BackedUp);

        let (state, _) = transition(state, &Event::PromoteOk);
        assert_eq!(state, State::Switched);

        let (state, _) = transition(state, &Event::LabelWritten);
        assert_eq!(state, State::Reconciled);

        let (state, _) = transition(state, &Event::Reconciled);
        assert_eq!(state, State::Committed);
    }

    #[test]
    fn promote_failure_triggers_rollback() {
        let (state, effects) = transition(State::BackedUp, &Event::PromoteFailed("denied".into()));
        assert_eq!(state, State::RollingBack);
        assert!(matches!(effects[0], Effect::Rollback));

        let (state, _) = transition(state, &Event::RollbackOk);
        assert_eq!(state, State::Aborted);
    }

    #[test]
    fn rollback_failure_reaches_broken() {
        let (state, _) = transition(State::RollingBack, &Event::RollbackFailed);
        assert_eq!(state, State::Broken);
    }

    #[test]
    fn extract_failure_aborts() {
        let (state, _) = transition(State::Prepared, &Event::ExtractFailed("bad archive".into()));
        assert_eq!(state, State::Aborted);
    }

    #[test]
    fn unknown_event_is_a_no_op() {
        let (state, effects) = transition(State::Committed, &Event::Start);
        assert_eq!(state, State::Committed);
        assert!(effects.is_empty());
    }

    #[test]
    fn zero_succeeded_entries_is_a_hard_failure() {
        use crate::environment::FakeEnvironment;
        use crate::xattr::FakeXAttrGateway;

        let dir = tempfile::tempdir().unwrap();
        let basedir = dir.path().join("base");
        std::fs::create_dir_all(basedir.join("rootfs")).unwrap();

        // An archive whose only entry is rejected by path normalization
        // (absolute path) so extraction opens fine but nothing succeeds.
        let archive_path = dir.path().join("bad.tar");
        {
            let file = std::fs::File::create(&archive_path).unwrap();
            let mut builder = ::tar::Builder::new(file);
            let mut header = ::tar::Header::new_gnu();
            header.set_size(0);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, "/etc/absolute", std::io::empty())
                .unwrap();
            builder.finish().unwrap();
        }

        let gateway = FakeXAttrGateway::new();
        let environment = FakeEnvironment::installed_at(basedir.clone());
        let to_gateway_path = |p: &Path| p.display().to_string();

        let inputs = TransactionInputs {
            source: &archive_path,
            basedir: &basedir,
            legacy_label: "ubuntu_trusty",
            promote_flush_delay: Duration::from_millis(0),
            clear_root_shadow_on_missing_hash: true,
            gateway: &gateway,
            to_gateway_path: &to_gateway_path,
            environment: &environment,
        };

        let err = run(inputs).unwrap_err();
        assert!(matches!(err, WslSwitchError::ExtractionTotalFailure { .. }));
        // Nothing was touched: the pre-transaction rootfs is still there.
        assert!(basedir.join("rootfs").is_dir());
    }
}
