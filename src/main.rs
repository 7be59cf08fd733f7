use std::process;

use mkoffload::{artifacts, pipeline};

fn main() {
    let argv: Vec<String> = std::env::args().skip(1).collect();

    // --verbose must take effect before anything logs, so peek ahead of
    // the real argument scan.
    let verbose = argv.iter().any(|arg| arg == "--verbose");
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if verbose { "debug" } else { "warn" }),
    )
    .init();

    artifacts::install_signal_cleanup();

    let code = match pipeline::run(&argv) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("mkoffload: error: {err}");
            err.exit_code()
        }
    };
    process::exit(code);
}
