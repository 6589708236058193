use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use smcipmi_exporter_collector::{
    CONTENT_TYPE, CycleOutcome, DEFAULT_CONFIG_FILE, ExporterConfig, OutputFormat, Poller,
    format_cycle, render_prometheus,
};
use smcipmi_exporter_core::{Assembler, MetricCatalog, Segmenter};
use tiny_http::{Header, Method, Response, Server};
use tracing::{Level, debug, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_PORT: u16 = 9850;
const DEFAULT_HTTP_WORKERS: usize = 4;

const LANDING_PAGE: &str = "<html>
<head><title>SMCIPMITool Exporter</title></head>
<body>
<h1>SMCIPMITool Exporter</h1>
<p><a href=\"/metrics\">Metrics</a></p>
</body>
</html>
";

/// Log verbosity accepted by `--log`.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "smcipmi-exporter")]
#[command(about = "Prometheus exporter for Supermicro power-supply data read through SMCIPMITool")]
#[command(version)]
struct Cli {
    /// Log level for exporter crates. RUST_LOG directives are applied too.
    #[arg(long, global = true, value_enum, default_value = "error")]
    log: LogLevel,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve metrics over HTTP, polling all targets on every scrape.
    Serve(ServeArgs),
    /// Run one polling cycle and print the result.
    Poll(PollArgs),
    /// Extract metrics from captured pminfo output in a file.
    ParseFile(ParseFileArgs),
    /// Extract metrics from captured pminfo output on stdin.
    ParseStdin(ParseStdinArgs),
    /// Validate a configuration file and report every problem found.
    CheckConfig(CheckConfigArgs),
}

#[derive(Debug, Args)]
struct ServeArgs {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Port to listen on.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    listen: String,
    /// Requests handled concurrently; a slow scrape only occupies one.
    #[arg(long, default_value_t = DEFAULT_HTTP_WORKERS)]
    http_workers: usize,
}

#[derive(Debug, Args)]
struct PollArgs {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Output format.
    #[arg(long, value_enum, default_value = "prometheus")]
    format: OutputFormat,
}

#[derive(Debug, Args)]
struct ExtractionArgs {
    /// Value of the `target` label.
    #[arg(long, default_value = "local")]
    target: String,
    /// Also extract output power, input voltage and input current.
    #[arg(long)]
    readings: bool,
    /// Custom module header regex with an `index` group.
    #[arg(long)]
    module_pattern: Option<String>,
    /// Output format.
    #[arg(long, value_enum, default_value = "prometheus")]
    format: OutputFormat,
}

#[derive(Debug, Args)]
struct ParseFileArgs {
    /// Path to a file containing pminfo output.
    #[arg(long)]
    input: PathBuf,
    #[command(flatten)]
    extraction: ExtractionArgs,
}

#[derive(Debug, Args)]
struct ParseStdinArgs {
    #[command(flatten)]
    extraction: ExtractionArgs,
}

#[derive(Debug, Args)]
struct CheckConfigArgs {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = init_logging(cli.log) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }

    let result = match cli.command {
        Command::Serve(args) => run_serve(args),
        Command::Poll(args) => run_poll(args),
        Command::ParseFile(args) => run_parse_file(args),
        Command::ParseStdin(args) => run_parse_stdin(args),
        Command::CheckConfig(args) => run_check_config(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_logging(level: LogLevel) -> Result<(), String> {
    let level = Level::from(level);
    let mut filter = EnvFilter::from_default_env();
    for krate in [
        "smcipmi_exporter",
        "smcipmi_exporter_core",
        "smcipmi_exporter_collector",
    ] {
        let directive = format!("{krate}={level}")
            .parse()
            .map_err(|err| format!("Invalid log directive for {krate}: {err}"))?;
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn load_config(path: &Path) -> Result<ExporterConfig, String> {
    ExporterConfig::load_validated(path)
        .map_err(|err| format!("Failed to load '{}': {err}", path.display()))
}

fn run_serve(args: ServeArgs) -> Result<(), String> {
    let config = load_config(&args.config)?;
    let poller = Poller::from_config(&config).map_err(|err| err.to_string())?;

    let address = format!("{}:{}", args.listen, args.port);
    let server =
        Server::http(&address).map_err(|err| format!("Failed to listen on {address}: {err}"))?;
    info!(
        address = %address,
        targets = poller.targets().len(),
        workers = args.http_workers.max(1),
        "Serving metrics on /metrics"
    );

    serve_requests(&server, &poller, args.http_workers);
    Ok(())
}

/// Answers requests on `workers` threads sharing one listener. Returns once
/// the server stops accepting connections.
fn serve_requests(server: &Server, poller: &Poller, workers: usize) {
    std::thread::scope(|scope| {
        for worker in 0..workers.max(1) {
            scope.spawn(move || {
                for request in server.incoming_requests() {
                    debug!(worker, method = %request.method(), url = %request.url(), "Handling request");
                    let (status, content_type, body) = route(poller, request.method(), request.url());
                    let response = text_response(status, content_type, body);
                    if let Err(err) = request.respond(response) {
                        warn!(error = %err, "Failed to send HTTP response");
                    }
                }
            });
        }
    });
}

/// Maps a request to `(status, content type, body)`.
fn route(poller: &Poller, method: &Method, url: &str) -> (u16, &'static str, String) {
    let path = url.split('?').next().unwrap_or_default();
    if !matches!(method, Method::Get | Method::Head) {
        return (405, "text/plain", "method not allowed\n".to_string());
    }

    match path {
        "/metrics" => {
            let cycle = poller.poll_cycle();
            match render_prometheus(poller.catalog(), &cycle) {
                Ok(text) => (200, CONTENT_TYPE, text),
                Err(err) => {
                    warn!(error = %err, "Failed to render metrics");
                    (500, "text/plain", format!("failed to render metrics: {err}\n"))
                }
            }
        }
        "/" => (200, "text/html", LANDING_PAGE.to_string()),
        _ => (404, "text/plain", "not found\n".to_string()),
    }
}

fn text_response(status: u16, content_type: &str, body: String) -> Response<Cursor<Vec<u8>>> {
    let response = Response::from_string(body).with_status_code(status);
    match Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes()) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}

fn run_poll(args: PollArgs) -> Result<(), String> {
    let config = load_config(&args.config)?;
    let poller = Poller::from_config(&config).map_err(|err| err.to_string())?;

    let cycle = poller.poll_cycle();
    let output = format_cycle(poller.catalog(), &cycle, args.format)?;
    print!("{output}");

    let failed: Vec<&str> = cycle.failed_targets().collect();
    if !failed.is_empty() {
        eprintln!("{} of {} targets failed: {}", failed.len(), cycle.targets.len(), failed.join(", "));
    }
    Ok(())
}

fn run_parse_file(args: ParseFileArgs) -> Result<(), String> {
    let raw = fs::read_to_string(&args.input)
        .map_err(|err| format!("Failed to read '{}': {err}", args.input.display()))?;
    run_extraction(&args.extraction, &raw)
}

fn run_parse_stdin(args: ParseStdinArgs) -> Result<(), String> {
    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .map_err(|err| format!("Failed to read stdin: {err}"))?;
    run_extraction(&args.extraction, &raw)
}

fn run_extraction(args: &ExtractionArgs, raw: &str) -> Result<(), String> {
    let catalog = if args.readings {
        MetricCatalog::with_electrical_readings()
    } else {
        MetricCatalog::standard()
    };
    let segmenter = match args.module_pattern.as_deref() {
        Some(pattern) => Segmenter::with_pattern(pattern).map_err(|err| err.to_string())?,
        None => Segmenter::default(),
    };

    let outcome = Assembler::new(&catalog)
        .with_segmenter(segmenter)
        .assemble(&args.target, raw);
    let cycle = CycleOutcome::from_extraction(outcome);
    let output = format_cycle(&catalog, &cycle, args.format)?;
    print!("{output}");
    Ok(())
}

fn run_check_config(args: CheckConfigArgs) -> Result<(), String> {
    let config = ExporterConfig::load(&args.config)
        .map_err(|err| format!("Failed to load '{}': {err}", args.config.display()))?;

    let issues = config.validate();
    if !issues.is_empty() {
        for issue in &issues {
            eprintln!("  - {issue}");
        }
        return Err(format!(
            "{} problem(s) in '{}'",
            issues.len(),
            args.config.display()
        ));
    }

    let mut collectors = Vec::new();
    if config.collectors.pminfo {
        collectors.push("pminfo");
    }
    if config.collectors.pminfo_readings {
        collectors.push("pminfo_readings");
    }
    println!(
        "Configuration OK: {} target(s), collectors: {}",
        config.targets.len(),
        if collectors.is_empty() {
            "none".to_string()
        } else {
            collectors.join(", ")
        }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::net::{SocketAddr, TcpStream};
    use std::time::{Duration, Instant};

    use smcipmi_exporter_collector::{AcquisitionError, Login, ReportSource};

    use super::*;

    const REPORT: &str = "[Module 1]\nStatus | [STATUS OK]\nInput Power | 42 W\n";

    struct StaticSource {
        report: &'static str,
        delay: Duration,
    }

    impl ReportSource for StaticSource {
        fn fetch(&self, _target: &str, _login: &Login) -> Result<String, AcquisitionError> {
            std::thread::sleep(self.delay);
            Ok(self.report.to_string())
        }
    }

    fn poller_with_delay(delay: Duration) -> Poller {
        let config = ExporterConfig::from_yaml_str(
            "targets: [bmc-a]\nlogin: {user: ADMIN, password: secret}\ncollectors: {pminfo: true}\njobs: 1\n",
        )
        .unwrap();
        Poller::with_source(&config, Box::new(StaticSource { report: REPORT, delay })).unwrap()
    }

    fn poller() -> Poller {
        poller_with_delay(Duration::ZERO)
    }

    fn http_get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        write!(stream, "GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    }

    #[test]
    fn test_landing_page_answers_while_scrape_is_running() {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let poller = poller_with_delay(Duration::from_secs(2));
        std::thread::spawn(move || serve_requests(&server, &poller, 2));

        let scrape = std::thread::spawn(move || http_get(addr, "/metrics"));
        std::thread::sleep(Duration::from_millis(300));

        let started = Instant::now();
        let landing = http_get(addr, "/");
        assert!(started.elapsed() < Duration::from_secs(1), "took {:?}", started.elapsed());
        assert!(landing.starts_with("HTTP/1.1 200"), "{landing}");
        assert!(landing.contains("href=\"/metrics\""));

        let metrics = scrape.join().unwrap();
        assert!(metrics.starts_with("HTTP/1.1 200"), "{metrics}");
        assert!(metrics.contains("smcipmi_pminfo_power_consumption_watts{module=\"1\",target=\"bmc-a\"} 42"));
    }

    #[test]
    fn test_route_metrics() {
        let (status, content_type, body) = route(&poller(), &Method::Get, "/metrics?collect=pminfo");
        assert_eq!(status, 200);
        assert_eq!(content_type, CONTENT_TYPE);
        assert!(body.contains("smcipmi_pminfo_power_consumption_watts{module=\"1\",target=\"bmc-a\"} 42"));
    }

    #[test]
    fn test_route_landing_page_and_not_found() {
        let poller = poller();
        let (status, content_type, body) = route(&poller, &Method::Get, "/");
        assert_eq!((status, content_type), (200, "text/html"));
        assert!(body.contains("href=\"/metrics\""));

        assert_eq!(route(&poller, &Method::Get, "/favicon.ico").0, 404);
        assert_eq!(route(&poller, &Method::Post, "/metrics").0, 405);
    }
}
