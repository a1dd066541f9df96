use std::time::Duration;

use clap::Parser;

use wslswitch::catalog;
use wslswitch::cli::{Cli, Command};
use wslswitch::config;
use wslswitch::environment::Environment;
use wslswitch::error::WslSwitchError;
use wslswitch::fetcher;
use wslswitch::hooks;
use wslswitch::logging;
use wslswitch::paths;
use wslswitch::transaction::{self, TransactionInputs};
use wslswitch::xattr::XAttrGateway;

#[cfg(windows)]
fn make_environment(candidates: Vec<std::path::PathBuf>) -> impl Environment {
    wslswitch::environment::WindowsEnvironment::new(candidates)
}

#[cfg(not(windows))]
fn make_environment(_candidates: Vec<std::path::PathBuf>) -> impl Environment {
    wslswitch::environment::FakeEnvironment::installed_at(std::path::PathBuf::from("."))
}

#[cfg(windows)]
fn make_gateway() -> impl XAttrGateway {
    wslswitch::xattr::WindowsXAttrGateway::new()
}

#[cfg(not(windows))]
fn make_gateway() -> impl XAttrGateway {
    wslswitch::xattr::FakeXAttrGateway::new()
}

fn to_gateway_path(path: &std::path::Path) -> String {
    path.display().to_string()
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config_path = cli.config.unwrap_or_else(paths::default_config_path);
    let sys_config = config::load_config_or_default(&config_path)?;

    match cli.command {
        Command::Install { target, no_hooks } => run_install(&sys_config, &target, no_hooks).await?,
        Command::Switch { target } => run_switch(&sys_config, &target)?,
        Command::Get { target, output } => run_get(&sys_config, &target, output).await?,
    }

    Ok(())
}

async fn run_install(
    sys_config: &config::WslSwitchConfig,
    target: &str,
    no_hooks: bool,
) -> Result<(), WslSwitchError> {
    let cache_dir = sys_config.resolved_cache_dir();
    let archive_path = fetcher::ensure_archive(target, &cache_dir).await?;

    let environment = make_environment(sys_config.basedir_candidates.clone());
    let location = environment.probe()?;
    let gateway = make_gateway();

    let inputs = TransactionInputs {
        source: &archive_path,
        basedir: &location.basedir,
        legacy_label: &sys_config.legacy_label,
        promote_flush_delay: Duration::from_millis(sys_config.promote_flush_delay_ms),
        clear_root_shadow_on_missing_hash: sys_config.clear_root_shadow_on_missing_hash,
        gateway: &gateway,
        to_gateway_path: &to_gateway_path,
        environment: &environment,
    };

    let outcome = transaction::run(inputs)?;
    let rootfs = location.basedir.join("rootfs");
    hooks::run_post_install(&rootfs, &environment, no_hooks)?;

    if let Some(label) = &outcome.new_label {
        println!("Installed and switched to '{label}'");
    }
    if let Some(report) = &outcome.extract_report {
        println!(
            "{}/{} entries extracted ({} errors)",
            report.succeeded,
            report.total,
            report.per_entry_errors.len()
        );
    }

    Ok(())
}

fn run_switch(sys_config: &config::WslSwitchConfig, target: &str) -> Result<(), WslSwitchError> {
    let environment = make_environment(sys_config.basedir_candidates.clone());
    let location = environment.probe()?;

    let (image, tag) = fetcher::split_image_tag(target);
    let entry = catalog::resolve(image, tag);
    let target_label = entry.map(|e| e.label.to_string()).unwrap_or_else(|| target.to_string());

    let rootfs = location.basedir.join("rootfs");
    let current_label = wslswitch::label::read(&rootfs, None)?
        .unwrap_or_else(|| sys_config.legacy_label.clone());

    if current_label == target_label {
        return Err(WslSwitchError::AlreadyActive {
            image: image.to_string(),
            tag: tag.unwrap_or("latest").to_string(),
        });
    }

    transaction::switch_to_label(&location.basedir, &current_label, &target_label)?;
    println!("Switched to '{target_label}'");
    Ok(())
}

async fn run_get(
    sys_config: &config::WslSwitchConfig,
    target: &str,
    output: Option<std::path::PathBuf>,
) -> Result<(), WslSwitchError> {
    let cache_dir = sys_config.resolved_cache_dir();
    let archive_path = fetcher::ensure_archive(target, &cache_dir).await?;

    let output_dir = output.unwrap_or_else(paths::default_get_output_dir);
    std::fs::create_dir_all(&output_dir).map_err(|e| WslSwitchError::Io {
        context: format!("creating {}", output_dir.display()),
        source: e,
    })?;

    let filename = archive_path
        .file_name()
        .map(std::path::Path::new)
        .unwrap_or_else(|| std::path::Path::new("rootfs.tar"));
    let dest = output_dir.join(filename);
    std::fs::copy(&archive_path, &dest).map_err(|e| WslSwitchError::Io {
        context: format!("copying archive to {}", dest.display()),
        source: e,
    })?;

    println!("Wrote {}", dest.display());
    Ok(())
}
