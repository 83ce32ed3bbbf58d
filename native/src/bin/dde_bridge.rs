use dde_bridge::cli::{self, EXIT_ARGUMENT_ERROR};
use dde_bridge::command::CommandResult;
use dde_bridge::config::BridgeSettings;
use dde_bridge::timing::SystemClock;
use dde_bridge::{dde, logging};
use log::{error, info};
use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    // Load or ignore .env file
    let _ = dotenvy::dotenv();

    let args = match cli::parse_args(std::env::args_os()) {
        Ok(args) => args,
        Err(e) if cli::is_informational(&e) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => return fail(&CommandResult::error(cli::usage_error(&e).to_string())),
    };

    logging::init_logger(args.log_level.as_deref());
    logging::init_crash_logger();

    // DDE_BRIDGE_SENTRY_DSN from .env file or environment
    if let Ok(dsn) = std::env::var("DDE_BRIDGE_SENTRY_DSN") {
        let environment = std::env::var("SENTRY_ENVIRONMENT").ok();
        if logging::init_sentry(Some(&dsn), environment.as_deref()) {
            info!("[CLI] Sentry monitoring initialized - Environment: {:?}", environment);
        }
    }

    info!("[CLI] dde-bridge {}", dde_bridge::get_version());

    let settings = match BridgeSettings::from_env() {
        Ok(settings) => args.apply_overrides(settings),
        Err(e) => {
            logging::log_critical_error("Configuration", &e.to_string());
            let code = fail(&CommandResult::error(e.to_string()));
            logging::shutdown_sentry();
            return code;
        }
    };

    let host = dde::platform_host(settings.transaction_timeout);
    let clock = SystemClock::new();
    let outcome = cli::execute(&args, &settings, &host, &clock, &mut io::stdout().lock());

    logging::shutdown_sentry();

    match outcome {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("[CLI] Failed to write result: {}", e);
            ExitCode::from(EXIT_ARGUMENT_ERROR)
        }
    }
}

fn fail(result: &CommandResult) -> ExitCode {
    if let Err(e) = cli::emit(&mut io::stdout().lock(), result) {
        error!("[CLI] Failed to write result: {}", e);
    }
    ExitCode::from(EXIT_ARGUMENT_ERROR)
}
