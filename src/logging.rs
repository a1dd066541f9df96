use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber once at startup.
///
/// `--verbose` forces `debug` everywhere; otherwise `RUST_LOG` is honored
/// with `wslswitch=info` as the baseline so dependency crates stay quiet.
pub fn init(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
            .add_directive("wslswitch=info".parse().expect("valid log directive"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
