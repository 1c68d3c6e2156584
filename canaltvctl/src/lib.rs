use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;

use canaltv_core::{
    load_canaltv_config, load_m3u, CanaltvConfig, ChannelFilter, ChannelRecord, ChannelRegistry,
    HealthScheduler, PlaylistError, ProbeError, RegistryError, RegistrySummary, SchedulerError,
    StreamProbe, SweepSummary,
};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] canaltv_core::ConfigError),
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error("probe error: {0}")]
    Probe(#[from] ProbeError),
    #[error("playlist error: {0}")]
    Playlist(#[from] PlaylistError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("authentication failed")]
    Authentication,
    #[error("required resource missing: {0}")]
    MissingResource(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "CanalTV stream-health command-line interface", long_about = None)]
pub struct Cli {
    /// Caminho do canaltv.toml principal
    #[arg(long, default_value = "configs/canaltv.toml")]
    pub config: PathBuf,
    /// Diretório override para dados (substitui paths.data_dir)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    /// Caminho alternativo para channels.sqlite
    #[arg(long)]
    pub registry_db: Option<PathBuf>,
    /// Token para autenticação local (se CANALTVCTL_TOKEN estiver definido)
    #[arg(long)]
    pub token: Option<String>,
    /// Formato de saída
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Exibe status resumido do registro de canais
    Status,
    /// Operações sobre o catálogo de canais
    #[command(subcommand)]
    Channel(ChannelCommands),
    /// Monitoramento de saúde dos streams
    #[command(subcommand)]
    Health(HealthCommands),
}

#[derive(Subcommand, Debug)]
pub enum ChannelCommands {
    /// Lista canais registrados
    List(ChannelListArgs),
    /// Mostra um canal específico
    Show(ChannelShowArgs),
    /// Importa canais de uma playlist M3U
    Import(ChannelImportArgs),
    /// Alterna a curadoria manual de um canal
    Validate(ChannelValidateArgs),
}

#[derive(Args, Debug)]
pub struct ChannelListArgs {
    /// Apenas canais online
    #[arg(long, conflicts_with = "offline")]
    pub online: bool,
    /// Apenas canais offline
    #[arg(long)]
    pub offline: bool,
    /// Filtrar por categoria (group-title)
    #[arg(long)]
    pub group: Option<String>,
    /// Limite de registros retornados
    #[arg(long, default_value_t = 50)]
    pub limit: usize,
}

#[derive(Args, Debug)]
pub struct ChannelShowArgs {
    /// Identificador do canal
    pub id: String,
}

#[derive(Args, Debug)]
pub struct ChannelImportArgs {
    /// Caminho da playlist M3U
    pub playlist: PathBuf,
}

#[derive(Args, Debug)]
pub struct ChannelValidateArgs {
    /// Identificador do canal
    pub id: String,
    /// Remove a marca de curadoria em vez de aplicá-la
    #[arg(long)]
    pub off: bool,
}

#[derive(Subcommand, Debug)]
pub enum HealthCommands {
    /// Executa uma varredura completa imediatamente
    Sweep,
    /// Reverifica um único canal
    Check(HealthCheckArgs),
    /// Executa o agendador de varreduras em primeiro plano
    Watch,
}

#[derive(Args, Debug)]
pub struct HealthCheckArgs {
    /// Identificador do canal
    pub id: String,
}

pub fn run(cli: Cli) -> Result<()> {
    enforce_token(&cli)?;
    let context = AppContext::new(&cli)?;

    match &cli.command {
        Commands::Status => {
            let status = context.gather_status()?;
            render(&status, cli.format)?;
        }
        Commands::Channel(ChannelCommands::List(args)) => {
            let list = context.channel_list(args)?;
            render(&list, cli.format)?;
        }
        Commands::Channel(ChannelCommands::Show(args)) => {
            let view = context.channel_show(args)?;
            render(&view, cli.format)?;
        }
        Commands::Channel(ChannelCommands::Import(args)) => {
            let report = context.channel_import(args)?;
            render(&report, cli.format)?;
        }
        Commands::Channel(ChannelCommands::Validate(args)) => {
            let view = context.channel_validate(args)?;
            render(&view, cli.format)?;
        }
        Commands::Health(HealthCommands::Sweep) => {
            let report = context.health_sweep()?;
            render(&report, cli.format)?;
        }
        Commands::Health(HealthCommands::Check(args)) => {
            let report = context.health_check(args)?;
            render(&report, cli.format)?;
        }
        Commands::Health(HealthCommands::Watch) => {
            context.health_watch()?;
        }
    }

    Ok(())
}

fn enforce_token(cli: &Cli) -> Result<()> {
    if let Ok(expected) = std::env::var("CANALTVCTL_TOKEN") {
        match &cli.token {
            Some(provided) if provided == &expected => Ok(()),
            _ => Err(AppError::Authentication),
        }
    } else {
        Ok(())
    }
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug)]
struct AppContext {
    config: CanaltvConfig,
    registry_db: PathBuf,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let config = load_canaltv_config(&cli.config)?;
        let data_dir = cli
            .data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(&config.paths.data_dir));
        let registry_db = cli
            .registry_db
            .clone()
            .unwrap_or_else(|| data_dir.join(&config.registry.database));
        Ok(Self {
            config,
            registry_db,
        })
    }

    fn open_registry(&self) -> Result<ChannelRegistry> {
        if !self.registry_db.exists() {
            return Err(AppError::MissingResource(format!(
                "Banco de canais ausente: {}",
                self.registry_db.display()
            )));
        }
        Ok(ChannelRegistry::builder()
            .path(&self.registry_db)
            .read_only(true)
            .build()?)
    }

    fn open_registry_rw(&self, create: bool) -> Result<ChannelRegistry> {
        if !create && !self.registry_db.exists() {
            return Err(AppError::MissingResource(format!(
                "Banco de canais ausente: {}",
                self.registry_db.display()
            )));
        }
        if create {
            if let Some(parent) = self.registry_db.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let registry = ChannelRegistry::builder()
            .path(&self.registry_db)
            .create_if_missing(create)
            .build()?;
        if create {
            registry.initialize()?;
        }
        Ok(registry)
    }

    fn scheduler(&self, registry: ChannelRegistry) -> Result<HealthScheduler> {
        let prober = Arc::new(StreamProbe::new(&self.config.probe)?);
        Ok(HealthScheduler::new(
            registry,
            &self.config.monitor,
            prober,
        ))
    }

    fn gather_status(&self) -> Result<StatusReport> {
        let registry = self.open_registry()?;
        Ok(StatusReport {
            node: NodeStatus {
                node_name: self.config.system.node_name.clone(),
                environment: self.config.system.environment.clone(),
            },
            channels: registry.summary()?,
        })
    }

    fn channel_list(&self, args: &ChannelListArgs) -> Result<ChannelList> {
        let registry = self.open_registry()?;
        let online = if args.online {
            Some(true)
        } else if args.offline {
            Some(false)
        } else {
            None
        };
        let rows = registry
            .list(&ChannelFilter {
                online,
                group_title: args.group.clone(),
                limit: Some(args.limit),
            })?
            .into_iter()
            .map(ChannelView::from)
            .collect();
        Ok(ChannelList { rows })
    }

    fn channel_show(&self, args: &ChannelShowArgs) -> Result<ChannelView> {
        let registry = self.open_registry()?;
        registry
            .channel_by_id(&args.id)?
            .map(ChannelView::from)
            .ok_or_else(|| AppError::MissingResource(format!("Canal desconhecido: {}", args.id)))
    }

    fn channel_import(&self, args: &ChannelImportArgs) -> Result<ImportReport> {
        let channels = load_m3u(&args.playlist)?;
        let registry = self.open_registry_rw(true)?;
        let registered = registry.register_all(&channels)?;
        Ok(ImportReport {
            parsed: channels.len(),
            registered,
        })
    }

    fn channel_validate(&self, args: &ChannelValidateArgs) -> Result<ChannelView> {
        let registry = self.open_registry_rw(false)?;
        registry.set_validated(&args.id, !args.off)?;
        registry
            .channel_by_id(&args.id)?
            .map(ChannelView::from)
            .ok_or_else(|| AppError::MissingResource(format!("Canal desconhecido: {}", args.id)))
    }

    fn health_sweep(&self) -> Result<SweepReport> {
        let registry = self.open_registry_rw(false)?;
        let scheduler = self.scheduler(registry)?;
        let runtime = tokio::runtime::Runtime::new()?;
        let summary = runtime.block_on(scheduler.run_sweep())?;
        Ok(SweepReport { summary })
    }

    fn health_check(&self, args: &HealthCheckArgs) -> Result<CheckReport> {
        let registry = self.open_registry_rw(false)?;
        let scheduler = self.scheduler(registry)?;
        let runtime = tokio::runtime::Runtime::new()?;
        let is_online = runtime.block_on(scheduler.check_channel(&args.id))?;
        Ok(CheckReport {
            id: args.id.clone(),
            is_online,
        })
    }

    fn health_watch(&self) -> Result<()> {
        let registry = self.open_registry_rw(false)?;
        let scheduler = Arc::new(self.scheduler(registry)?);
        let sweep_interval =
            Duration::from_secs(self.config.monitor.sweep_interval_hours.max(1) * 3600);
        println!("Agendador em execução (Ctrl-C para encerrar)");
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(async move {
            let handle = scheduler.start(sweep_interval);
            tokio::signal::ctrl_c().await?;
            handle.stop().await;
            Ok::<_, std::io::Error>(())
        })?;
        println!("Agendador encerrado");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub node: NodeStatus,
    pub channels: RegistrySummary,
}

impl DisplayFallback for StatusReport {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "Nodo: {} (env: {})",
            self.node.node_name, self.node.environment
        )];
        lines.push(format!(
            "Canais: {} no total | {} online | {} offline",
            self.channels.total, self.channels.online, self.channels.offline
        ));
        lines.push(format!(
            "Nunca verificados: {} | Validados: {}",
            self.channels.never_checked, self.channels.validated
        ));
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct NodeStatus {
    pub node_name: String,
    pub environment: String,
}

#[derive(Debug, Serialize)]
pub struct ChannelList {
    pub rows: Vec<ChannelView>,
}

impl DisplayFallback for ChannelList {
    fn display(&self) -> String {
        if self.rows.is_empty() {
            return "Nenhum canal encontrado".to_string();
        }
        let mut lines = Vec::new();
        for entry in &self.rows {
            lines.push(format!(
                "{id} | {name} | {state} | falhas={failures} | grupo={group}",
                id = entry.id,
                name = entry.name,
                state = if entry.is_online { "online" } else { "offline" },
                failures = entry.consecutive_failures,
                group = entry.group_title.as_deref().unwrap_or("-"),
            ));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct ChannelView {
    pub id: String,
    pub name: String,
    pub country: Option<String>,
    pub group_title: Option<String>,
    pub source_url: String,
    pub is_online: bool,
    pub consecutive_failures: u32,
    pub last_checked: Option<String>,
    pub validated: bool,
}

impl From<ChannelRecord> for ChannelView {
    fn from(record: ChannelRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            country: record.country,
            group_title: record.group_title,
            source_url: record.source_url,
            is_online: record.health.is_online,
            consecutive_failures: record.health.consecutive_failures,
            last_checked: record.health.last_checked.map(|ts| ts.to_rfc3339()),
            validated: record.validated,
        }
    }
}

impl DisplayFallback for ChannelView {
    fn display(&self) -> String {
        let mut lines = vec![format!("{} — {}", self.id, self.name)];
        lines.push(format!("  url: {}", self.source_url));
        lines.push(format!(
            "  estado: {} (falhas consecutivas: {})",
            if self.is_online { "online" } else { "offline" },
            self.consecutive_failures
        ));
        lines.push(format!(
            "  última verificação: {}",
            self.last_checked.as_deref().unwrap_or("nunca")
        ));
        lines.push(format!(
            "  curadoria: {}",
            if self.validated { "validado" } else { "pendente" }
        ));
        if let Some(group) = &self.group_title {
            lines.push(format!("  grupo: {group}"));
        }
        if let Some(country) = &self.country {
            lines.push(format!("  país: {country}"));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct ImportReport {
    pub parsed: usize,
    pub registered: usize,
}

impl DisplayFallback for ImportReport {
    fn display(&self) -> String {
        format!(
            "Playlist importada: {} entradas, {} canais novos",
            self.parsed, self.registered
        )
    }
}

#[derive(Debug, Serialize)]
pub struct SweepReport {
    pub summary: SweepSummary,
}

impl DisplayFallback for SweepReport {
    fn display(&self) -> String {
        if self.summary.checked == 0 {
            return "Nenhum canal pendente de verificação".to_string();
        }
        format!(
            "Varredura concluída: {} verificados | {} online | {} offline",
            self.summary.checked, self.summary.online, self.summary.offline
        )
    }
}

#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub id: String,
    pub is_online: bool,
}

impl DisplayFallback for CheckReport {
    fn display(&self) -> String {
        format!(
            "Canal {}: {}",
            self.id,
            if self.is_online { "online" } else { "offline" }
        )
    }
}
