use log::{error, info, LevelFilter};
use once_cell::sync::OnceCell;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

pub const CRASH_LOG_DIR: &str = "RSLinxDdeBridge";
pub const CRASH_LOG_FILE: &str = "bridge_crash.log";

static CRASH_LOG_PATH: OnceCell<PathBuf> = OnceCell::new();
static SENTRY_GUARD: Mutex<Option<sentry::ClientInitGuard>> = Mutex::new(None);

/// Initialize Sentry monitoring with optional DSN.
/// If DSN is None or empty, Sentry will be disabled.
pub fn init_sentry(dsn: Option<&str>, environment: Option<&str>) -> bool {
    let dsn_value = match dsn {
        Some(d) if !d.is_empty() => d,
        _ => {
            info!("[SENTRY] No DSN provided - Sentry disabled");
            return false;
        }
    };

    let env_cow = environment.map(|e| std::borrow::Cow::Owned(e.to_string()));

    let guard = sentry::init((
        dsn_value,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: env_cow,
            attach_stacktrace: true,
            send_default_pii: false,
            ..Default::default()
        },
    ));

    if !guard.is_enabled() {
        info!("[SENTRY] Failed to initialize");
        return false;
    }

    match SENTRY_GUARD.lock() {
        Ok(mut slot) => {
            *slot = Some(guard);
            info!("[SENTRY] Initialized - Environment: {:?}", environment);
            true
        }
        Err(_) => false,
    }
}

/// Check if Sentry is currently enabled.
pub fn is_sentry_enabled() -> bool {
    SENTRY_GUARD
        .lock()
        .map(|guard| guard.as_ref().is_some_and(|g| g.is_enabled()))
        .unwrap_or(false)
}

/// Shutdown Sentry, flushing pending events. The process is short-lived,
/// so this must run before exit or queued events are lost.
pub fn shutdown_sentry() {
    let guard = SENTRY_GUARD.lock().ok().and_then(|mut slot| slot.take());
    if let Some(guard) = guard {
        info!("[SENTRY] Flushing events");
        drop(guard);
    }
}

/// Capture a critical error to Sentry. Use only for failures that stop the
/// invocation before any DDE work happens.
pub fn capture_critical_error(context: &str, error: &str) {
    if is_sentry_enabled() {
        sentry::with_scope(
            |scope| {
                scope.set_tag("error_type", "critical");
                scope.set_tag("context", context);
                scope.set_level(Some(sentry::Level::Fatal));
            },
            || {
                sentry::capture_message(
                    &format!("[CRITICAL] {}: {}", context, error),
                    sentry::Level::Fatal,
                );
            },
        );
    }
}

/// Initialize env_logger on stderr. `filter` (from `--log-level`) wins over
/// `RUST_LOG`; with neither, only warnings and errors are shown. Stdout is
/// reserved for the JSON result.
pub fn init_logger(filter: Option<&str>) {
    let mut builder = env_logger::Builder::from_default_env();
    builder.target(env_logger::Target::Stderr);

    match filter {
        Some(filters) => {
            builder.parse_filters(filters);
        }
        None if std::env::var("RUST_LOG").is_err() => {
            builder.filter_level(LevelFilter::Warn);
        }
        None => {}
    }

    builder.format(|buf, record| {
        writeln!(
            buf,
            "[{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        )
    });

    let _ = builder.try_init();
}

/// Initialize crash logging and panic hook.
pub fn init_crash_logger() {
    let log_dir = dirs::data_local_dir()
        .map(|local_data| local_data.join(CRASH_LOG_DIR))
        .unwrap_or_else(|| PathBuf::from("."));

    let _ = fs::create_dir_all(&log_dir);
    let log_path = CRASH_LOG_PATH.get_or_init(|| log_dir.join(CRASH_LOG_FILE));

    std::panic::set_hook(Box::new(move |panic_info| {
        let crash_msg = format_panic_message(panic_info);

        if is_sentry_enabled() {
            sentry::capture_message(&crash_msg, sentry::Level::Fatal);
        }

        if let Err(e) = write_crash_log(&crash_msg) {
            error!("[CRASH LOGGER] Failed to write crash log: {}", e);
        }

        error!("\n{}", crash_msg);
    }));

    info!("[CRASH LOGGER] Initialized - Log: {:?}", log_path);
}

fn timestamp() -> String {
    chrono::Local::now()
        .format("%Y-%m-%d %H:%M:%S%.3f")
        .to_string()
}

fn format_panic_message(panic_info: &std::panic::PanicHookInfo) -> String {
    let payload = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic payload".to_string()
    };

    let location = panic_info
        .location()
        .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
        .unwrap_or_else(|| "Unknown location".to_string());

    format!(
        r#"
===== BRIDGE PANIC =====
Timestamp: {}
Location: {}
Message: {}
Thread: {:?}

Backtrace:
{:?}

"#,
        timestamp(),
        location,
        payload,
        std::thread::current().name().unwrap_or("unnamed"),
        std::backtrace::Backtrace::capture()
    )
}

fn format_critical_message(context: &str, error: &str) -> String {
    format!(
        r#"
===== CRITICAL ERROR =====
Timestamp: {}
Context: {}
Error: {}

"#,
        timestamp(),
        context,
        error
    )
}

/// Append a message to the crash log. No-op until `init_crash_logger` ran.
fn write_crash_log(message: &str) -> std::io::Result<()> {
    if let Some(log_path) = CRASH_LOG_PATH.get() {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        writeln!(file, "{}", message)?;
    }
    Ok(())
}

/// Record a critical error in the crash log and Sentry without panicking.
pub fn log_critical_error(context: &str, error: &str) {
    capture_critical_error(context, error);

    if let Err(e) = write_crash_log(&format_critical_message(context, error)) {
        error!("[CRASH LOGGER] Failed to write critical error: {}", e);
    }

    error!("[{}] {}", context, error);
}
