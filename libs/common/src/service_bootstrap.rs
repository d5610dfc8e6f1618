//! Service bootstrap helpers: metadata, banner and logging initialization

use tracing::{info, Level};

use crate::logging::{self, LogConfig};

/// Service metadata for startup
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    /// Service name (e.g., "acqsrv")
    pub name: String,
    /// Service version from Cargo.toml
    pub version: String,
    pub description: String,
}

impl ServiceInfo {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: description.into(),
        }
    }
}

/// Logging options supplied by the service configuration
#[derive(Debug, Clone, Default)]
pub struct LoggingOptions {
    /// Level name (`trace`..`error`); `RUST_LOG` takes precedence
    pub level: Option<String>,
    /// Log root directory; `ACQSRV_LOG_DIR` takes precedence
    pub dir: Option<String>,
    pub json: bool,
    pub file: bool,
    pub no_color: bool,
}

/// Print the startup banner
pub fn print_startup_banner(service: &ServiceInfo) {
    let banner = r#"
  █████╗  ██████╗ ██████╗ ███████╗██████╗ ██╗   ██╗
 ██╔══██╗██╔════╝██╔═══██╗██╔════╝██╔══██╗██║   ██║
 ███████║██║     ██║   ██║███████╗██████╔╝██║   ██║
 ██╔══██║██║     ██║▄▄ ██║╚════██║██╔══██╗╚██╗ ██╔╝
 ██║  ██║╚██████╗╚██████╔╝███████║██║  ██║ ╚████╔╝
 ╚═╝  ╚═╝ ╚═════╝ ╚══▀▀═╝ ╚══════╝╚═╝  ╚═╝  ╚═══╝
    "#;

    info!("{}", banner);
    info!(" {} v{}", service.name.to_uppercase(), service.version);
    info!(" {}", service.description);
    info!("");
}

/// Parse a level name, falling back to INFO
pub fn parse_level(name: Option<&str>) -> Level {
    name.and_then(|s| s.parse::<Level>().ok())
        .unwrap_or(Level::INFO)
}

/// Initialize logging for a service
///
/// Log root directory priority:
/// 1. `ACQSRV_LOG_DIR` environment variable
/// 2. `options.dir`
/// 3. Default "logs"
pub fn init_logging(service: &ServiceInfo, options: &LoggingOptions) -> anyhow::Result<()> {
    logging::init_log_root(options.dir.as_deref());

    let console_level = parse_level(options.level.as_deref());
    let log_config = LogConfig {
        service_name: service.name.clone(),
        log_dir: logging::get_log_root().join(&service.name),
        console_level,
        file_level: console_level.max(Level::DEBUG),
        enable_json: options.json,
        enable_file: options.file,
        enable_ansi: !options.no_color,
    };

    logging::init_with_config(log_config).map_err(|e| anyhow::anyhow!("{}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_info_creation() {
        let service = ServiceInfo::new("acqsrv", "0.1.0", "Acquisition gateway");
        assert_eq!(service.name, "acqsrv");
        assert_eq!(service.version, "0.1.0");
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level(Some("debug")), Level::DEBUG);
        assert_eq!(parse_level(Some("WARN")), Level::WARN);
        assert_eq!(parse_level(Some("loud")), Level::INFO);
        assert_eq!(parse_level(None), Level::INFO);
    }
}
