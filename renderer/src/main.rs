//! Workshop renderer entry point
//!
//! `serve` runs the live content proxy in front of the generator; `render`
//! produces a ZIP of static HTML.

use clap::{Args, Parser, Subcommand};
use shared::{logging, process_info, process_warn, ProcessId, SharedError};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use renderer::{
    export::parse_data_value, CommandTemplateEngine, ConnectionArgs, ContentProxy, ExportOptions, GeneratorSettings,
    KubernetesSessionRegistry, LaunchPolicy, ProxySettings, RealConfigWriter, RealGeneratorLauncher,
    RealVariableSource, RegistrySettings, RendererError, RendererResult, ServeOutcome, StaticExporter, Teardown, WorkingDirectory,
};

#[derive(Parser, Debug)]
#[command(name = "renderer")]
#[command(about = "Render workshop content live per session or as static HTML")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the live content proxy
    Serve(ServeArgs),
    /// Render the workshop once into a ZIP file
    Render(RenderArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Workshop root directory (contains `workshop/`)
    #[arg(long, env = "WORKSHOP_ROOT", default_value = ".")]
    workshop_root: PathBuf,

    /// Workshop every session must be linked to
    #[arg(long, env = "WORKSHOP_NAME")]
    workshop: String,

    /// Portal every session must belong to
    #[arg(long, env = "PORTAL_NAME", default_value = "educates-cli")]
    portal: String,

    /// Static token clients must present in X-Access-Token
    #[arg(long, env = "ACCESS_TOKEN")]
    access_token: Option<String>,

    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, default_value_t = 10081)]
    port: u16,

    /// Local port for the content generator
    #[arg(long, default_value_t = 1313)]
    generator_port: u16,

    /// Content generator program
    #[arg(long, default_value = "hugo")]
    generator_binary: String,

    /// Directory holding generator themes
    #[arg(long)]
    themes_dir: Option<PathBuf>,

    /// Theme to render with when a themes directory is given
    #[arg(long, default_value = "educates")]
    theme: String,

    /// Expose the workshop tree at /workshop/files.tar
    #[arg(long)]
    serve_files: bool,

    /// Seconds to wait after launching the generator
    #[arg(long, default_value_t = 4)]
    warmup_secs: u64,

    /// Seconds to wait for the generator to reload a new config
    #[arg(long, default_value_t = 2)]
    reload_secs: u64,

    /// Consecutive failed launches allowed before giving up
    #[arg(long)]
    max_launch_attempts: Option<u32>,

    /// Seconds to wait after a failed launch before retrying
    #[arg(long, default_value_t = 0)]
    launch_backoff_secs: u64,

    /// Kubeconfig file (defaults to KUBECONFIG, then ~/.kube/config)
    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// Kubeconfig context (defaults to its current context)
    #[arg(long)]
    context: Option<String>,

    /// Cluster API server URL, bypassing any kubeconfig
    #[arg(long, env = "KUBERNETES_API_SERVER")]
    api_server: Option<String>,

    /// Bearer token file for the API server
    #[arg(long)]
    api_token_file: Option<PathBuf>,

    /// CA bundle for the API server
    #[arg(long)]
    api_ca_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Workshop root directory (contains `workshop/` and `resources/`)
    #[arg(long, default_value = ".")]
    workshop_root: PathBuf,

    /// Workshop definition, relative to the root unless absolute
    #[arg(long, default_value = "resources/workshop.yaml")]
    workshop_file: PathBuf,

    /// Image repository substituted for $(image_repository)
    #[arg(long, default_value = "localhost:5001")]
    image_repository: String,

    /// Version substituted for $(workshop_version)
    #[arg(long, default_value = "latest")]
    workshop_version: String,

    /// Template data value as key=value (repeatable)
    #[arg(long = "data-value", value_parser = parse_data_value)]
    data_values: Vec<(String, String)>,

    /// Templating program the definition is piped through
    #[arg(long, default_value = "ytt")]
    template_program: String,

    /// Content generator program
    #[arg(long, default_value = "hugo")]
    generator_binary: String,

    /// Directory holding generator themes
    #[arg(long)]
    themes_dir: Option<PathBuf>,

    /// Theme to render with when a themes directory is given
    #[arg(long, default_value = "educates")]
    theme: String,

    /// ZIP file to write
    #[arg(long, short = 'o')]
    output_file: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> RendererResult<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => {
            ProcessId::init_proxy();
            logging::init_tracing_with_level(Some(&args.log_level))?;
            run_serve(args).await.inspect_err(|e| logging::log_error(ProcessId::current(), "Content proxy", e))
        }
        Command::Render(args) => {
            ProcessId::init_export();
            logging::init_tracing_with_level(Some(&args.log_level))?;
            run_render(args).await.inspect_err(|e| logging::log_error(ProcessId::current(), "Static export", e))
        }
    }
}

async fn run_serve(args: ServeArgs) -> RendererResult<()> {
    let workshop_root = absolute_dir(&args.workshop_root)?;
    let bind_address = bind_address(&args.host, args.port)?;

    logging::log_startup(
        ProcessId::current(),
        &format!("content proxy for workshop {} on {}", args.workshop, bind_address),
    );

    let settings = ProxySettings {
        workshop_root,
        workshop_name: args.workshop,
        portal_name: args.portal,
        access_token: args.access_token.filter(|token| !token.is_empty()),
        generator: GeneratorSettings {
            binary: args.generator_binary,
            port: args.generator_port,
            themes_dir: args.themes_dir,
            theme: args.theme,
        },
        warmup: Duration::from_secs(args.warmup_secs),
        reload_delay: Duration::from_secs(args.reload_secs),
        launch_policy: LaunchPolicy {
            max_attempts: args.max_launch_attempts,
            backoff: Duration::from_secs(args.launch_backoff_secs),
        },
        serve_files: args.serve_files,
    };

    let registry_settings = RegistrySettings::resolve(ConnectionArgs {
        api_server: args.api_server,
        token_file: args.api_token_file,
        ca_file: args.api_ca_file,
        kubeconfig: args.kubeconfig,
        context: args.context,
    })
    .await?;
    process_info!(ProcessId::current(), "🔗 Using API server {}", registry_settings.api_server);
    let registry = KubernetesSessionRegistry::from_settings(&registry_settings).await?;

    let workdir = WorkingDirectory::create()?;
    process_info!(ProcessId::current(), "📁 Working directory {}", workdir.path().display());

    let writer = RealConfigWriter::new(workdir.path());
    let launcher = Arc::new(RealGeneratorLauncher::new(settings.generator.clone()));

    let teardown = Teardown::new(launcher.clone(), workdir).with_hook(Box::new(|| {
        logging::log_success(ProcessId::current(), "Content proxy stopped");
    }));

    let proxy = ContentProxy::new(settings, registry, RealVariableSource::new(), writer, launcher);
    let outcome = proxy.run(bind_address, teardown).await?;

    if let ServeOutcome::Signalled(signal) = outcome {
        process_warn!(ProcessId::current(), "⚠️ Exiting after {}", signal);
        std::process::exit(outcome.exit_code());
    }
    Ok(())
}

async fn run_render(args: RenderArgs) -> RendererResult<()> {
    let workshop_root = absolute_dir(&args.workshop_root)?;
    logging::log_startup(ProcessId::current(), &format!("static export of {}", workshop_root.display()));

    let options = ExportOptions {
        workshop_root,
        workshop_file: args.workshop_file,
        image_repository: args.image_repository,
        workshop_version: args.workshop_version,
        data_values: args.data_values,
        output_file: args.output_file,
    };

    let launcher = RealGeneratorLauncher::new(GeneratorSettings {
        binary: args.generator_binary,
        themes_dir: args.themes_dir,
        theme: args.theme,
        ..GeneratorSettings::default()
    });
    let exporter = StaticExporter::new(CommandTemplateEngine::new(args.template_program), launcher);

    let report = exporter.export(&options).await?;
    logging::log_success(
        ProcessId::current(),
        &format!(
            "Rendered '{}' ({} files) to {}",
            report.title,
            report.files,
            report.output_file.display()
        ),
    );
    Ok(())
}

fn absolute_dir(path: &Path) -> RendererResult<PathBuf> {
    let absolute = std::fs::canonicalize(path)
        .map_err(|e| RendererError::config(format!("workshop directory {}: {e}", path.display())))?;
    if !absolute.is_dir() {
        return Err(RendererError::config(format!("{} is not a directory", absolute.display())));
    }
    Ok(absolute)
}

fn bind_address(host: &str, port: u16) -> RendererResult<SocketAddr> {
    let ip: IpAddr = host.parse().map_err(|_| SharedError::InvalidConfig {
        field: "host".to_string(),
        value: host.to_string(),
    })?;
    Ok(SocketAddr::new(ip, port))
}
