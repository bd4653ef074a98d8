/// MySQL binlog 시간 추출기
///
/// 서버의 binlog 파일마다 시작/종료 시각, 지속 시간, 포함된 GTID 범위를 출력합니다.
use binlog_time_extractor::connection::ConnectionConfig;
use binlog_time_extractor::dispatcher::{
    DispatchOptions, DEFAULT_CONCURRENCY, DEFAULT_SERVER_ID_BASE,
};
use binlog_time_extractor::error::{ExtractorError, Result};
use binlog_time_extractor::extractor::{ExtractorConfig, TimeExtractor};
use binlog_time_extractor::probe::{ProbeOptions, DEFAULT_MAX_EVENTS};
use binlog_time_extractor::report::{self, OutputFormat, RenderOptions, TimeZoneMode};
use clap::{ArgAction, Parser, ValueEnum};
use std::process::ExitCode;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Table,
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Table => OutputFormat::Table,
            FormatArg::Json => OutputFormat::Json,
        }
    }
}

// -h 는 host 로 쓰므로 help 는 --help 만
#[derive(Debug, Parser)]
#[command(author, version, about, disable_help_flag = true)]
struct Cli {
    /// MySQL host
    #[arg(short = 'h', long, default_value = "localhost")]
    host: String,

    /// MySQL port
    #[arg(short = 'P', long, default_value_t = 3306)]
    port: u16,

    /// MySQL user
    #[arg(short = 'u', long, default_value = "root")]
    user: String,

    /// MySQL password (prompted when neither this nor MYSQL_PWD is set)
    #[arg(short = 'p', long, env = "MYSQL_PWD", hide_env_values = true)]
    password: Option<String>,

    #[arg(
        short = 'v',
        long,
        action = ArgAction::Count,
        help = "Increase log verbosity: -v = Info, -vv = Debug",
    )]
    verbose: u8,

    /// Number of replication sessions to run concurrently
    #[arg(short = 'n', long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// First replica server_id; each file adds its index
    #[arg(long, default_value_t = DEFAULT_SERVER_ID_BASE)]
    server_id_base: u32,

    /// Events to read from the head of each file
    #[arg(long, default_value_t = DEFAULT_MAX_EVENTS)]
    max_events: usize,

    /// Per-file probe timeout in seconds
    #[arg(long, value_name = "SECS")]
    probe_timeout: Option<u64>,

    /// Connection timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    connect_timeout: u64,

    #[arg(long, value_enum, default_value_t = FormatArg::Table)]
    format: FormatArg,

    /// List the newest binlog first
    #[arg(long)]
    newest_first: bool,

    /// Render times in UTC instead of local time
    #[arg(long)]
    utc: bool,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

impl Cli {
    fn extractor_config(&self, password: String) -> ExtractorConfig {
        ExtractorConfig {
            connection: ConnectionConfig {
                hostname: self.host.clone(),
                port: self.port,
                username: self.user.clone(),
                password,
                timeout: Duration::from_secs(self.connect_timeout),
            },
            dispatch: DispatchOptions {
                concurrency: self.concurrency,
                server_id_base: self.server_id_base,
                probe: ProbeOptions {
                    max_events: self.max_events,
                    timeout: self.probe_timeout.map(Duration::from_secs),
                },
            },
        }
    }

    fn render_options(&self) -> RenderOptions {
        RenderOptions {
            format: self.format.into(),
            time_zone: if self.utc {
                TimeZoneMode::Utc
            } else {
                TimeZoneMode::Local
            },
            newest_first: self.newest_first,
        }
    }
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => "binlog_time_extractor=warn",
        1 => "binlog_time_extractor=info",
        _ => "binlog_time_extractor=debug",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn read_password(cli: &Cli) -> Result<String> {
    match &cli.password {
        Some(password) => Ok(password.clone()),
        None => rpassword::prompt_password("Enter MySQL password: ").map_err(|e| {
            ExtractorError::ConfigError(format!("Failed to read the password: {}", e))
        }),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let password = read_password(&cli)?;
    let extractor = TimeExtractor::new(cli.extractor_config(password));

    let reports = extractor.run().await?;
    info!("Extracted time ranges for {} binlogs", reports.len());

    println!("{}", report::render(&reports, &cli.render_options())?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["binlog-time-extractor", "-p", "secret"]).unwrap();
        let config = cli.extractor_config(read_password(&cli).unwrap());

        assert_eq!(config.connection.hostname, "localhost");
        assert_eq!(config.connection.port, 3306);
        assert_eq!(config.connection.username, "root");
        assert_eq!(config.connection.password, "secret");
        assert_eq!(config.connection.timeout, Duration::from_secs(10));
        assert_eq!(config.dispatch.concurrency, 5);
        assert_eq!(config.dispatch.server_id_base, 33061);
        assert_eq!(config.dispatch.probe.max_events, 3);
        assert_eq!(config.dispatch.probe.timeout, None);

        let render = cli.render_options();
        assert_eq!(render.format, OutputFormat::Table);
        assert_eq!(render.time_zone, TimeZoneMode::Local);
        assert!(!render.newest_first);
    }

    #[test]
    fn test_short_flags() {
        let cli = Cli::try_parse_from([
            "binlog-time-extractor",
            "-h",
            "db.internal",
            "-P",
            "3307",
            "-u",
            "repl",
            "-p",
            "pw",
            "-n",
            "2",
            "-vv",
            "--probe-timeout",
            "30",
            "--format",
            "json",
            "--newest-first",
            "--utc",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        let config = cli.extractor_config("pw".to_string());
        assert_eq!(config.connection.hostname, "db.internal");
        assert_eq!(config.connection.port, 3307);
        assert_eq!(config.connection.username, "repl");
        assert_eq!(config.dispatch.concurrency, 2);
        assert_eq!(config.dispatch.probe.timeout, Some(Duration::from_secs(30)));

        let render = cli.render_options();
        assert_eq!(render.format, OutputFormat::Json);
        assert_eq!(render.time_zone, TimeZoneMode::Utc);
        assert!(render.newest_first);
    }

    #[test]
    fn test_rejects_bad_port() {
        assert!(Cli::try_parse_from(["binlog-time-extractor", "-P", "notaport"]).is_err());
    }
}
