#![allow(clippy::print_stdout)]

use std::path::PathBuf;

use anyhow::{Context, anyhow};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use demandas_client::{
    ClientConfig, ConfigError, DemandDraft, DemandPatch, DemandStatus, DemandasClient, Fetched,
    PushSubscription,
};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "demandas")]
#[command(about = "School demand tracker client")]
pub struct DemandasCli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub command: Commands,
}

/// Flags override the `DEMANDAS_*` environment.
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Backend script endpoint (DEMANDAS_ENDPOINT_URL).
    #[arg(long, global = true)]
    pub endpoint: Option<String>,
    /// Local store file (DEMANDAS_STORE_PATH).
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,
    /// Per-call timeout in milliseconds (DEMANDAS_TIMEOUT_MS).
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in and keep the session in the local store
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        senha: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// List demands (falls back to the local cache when offline)
    List,
    /// Create a demand
    Create(CreateArgs),
    /// Change status, owner, deadline or notes of a demand
    Update(UpdateArgs),
    /// Demands created offline and not yet sent
    Pending,
    /// Send demands created offline
    Sync,
    /// Counters from the last successful listing
    Stats,
    /// Upload a file attachment
    Upload {
        path: PathBuf,
        #[arg(long)]
        mime: Option<String>,
        #[arg(long)]
        demanda: Option<String>,
    },
    /// Send an email through the backend
    Email {
        #[arg(long)]
        para: String,
        #[arg(long)]
        assunto: String,
        #[arg(long)]
        mensagem: String,
    },
    /// Ask the backend to notify the schools of a cached demand
    Notify { id: String },
    /// Register a push subscription read from a JSON file
    Subscribe { file: PathBuf },
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    #[arg(long)]
    pub titulo: String,
    #[arg(long)]
    pub descricao: String,
    /// Repeat for several schools.
    #[arg(long = "escola", required = true)]
    pub escolas: Vec<String>,
    #[arg(long)]
    pub responsavel: String,
    /// YYYY-MM-DD, today or later.
    #[arg(long)]
    pub prazo: NaiveDate,
    #[arg(long)]
    pub prioridade: Option<String>,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    pub id: String,
    /// pendente, em andamento, concluida or cancelada.
    #[arg(long, value_parser = parse_status)]
    pub status: Option<DemandStatus>,
    #[arg(long)]
    pub responsavel: Option<String>,
    #[arg(long)]
    pub prazo: Option<NaiveDate>,
    #[arg(long)]
    pub observacao: Option<String>,
}

impl UpdateArgs {
    fn patch(&self) -> DemandPatch {
        DemandPatch {
            status: self.status.clone(),
            responsavel: self.responsavel.clone(),
            prazo: self.prazo,
            observacao: self.observacao.clone(),
        }
    }
}

fn parse_status(raw: &str) -> Result<DemandStatus, String> {
    let status = DemandStatus::parse(raw);
    if status.is_known() {
        Ok(status)
    } else {
        Err(format!(
            "unknown status `{}`; use pendente, em_andamento, concluida or cancelada",
            raw.trim()
        ))
    }
}

#[derive(Serialize)]
struct Listing<'a, T> {
    offline: bool,
    items: &'a T,
}

pub fn resolve_config(global: &GlobalArgs) -> anyhow::Result<ClientConfig> {
    let mut config = match ClientConfig::from_env() {
        Ok(mut config) => {
            if let Some(endpoint) = &global.endpoint {
                config.endpoint_url = ClientConfig::new(endpoint)?.endpoint_url;
            }
            config
        }
        Err(ConfigError::MissingEndpoint) => {
            let endpoint = global
                .endpoint
                .as_deref()
                .ok_or(ConfigError::MissingEndpoint)
                .context("pass --endpoint or set DEMANDAS_ENDPOINT_URL")?;
            ClientConfig::new(endpoint)?
        }
        Err(error) => return Err(error.into()),
    };
    if let Some(store) = &global.store {
        config.store_path.clone_from(store);
    }
    if let Some(timeout_ms) = global.timeout_ms {
        if timeout_ms == 0 {
            return Err(anyhow!("--timeout-ms must be greater than zero"));
        }
        config.timeout_ms = timeout_ms;
    }
    Ok(config)
}

pub async fn run(cli: DemandasCli) -> anyhow::Result<()> {
    let config = resolve_config(&cli.global)?;
    tracing::debug!(endpoint = %config.endpoint_url, store = %config.store_path.display(), "client configured");
    let client = DemandasClient::from_config(&config).context("build client")?;

    match cli.command {
        Commands::Login { email, senha } => {
            let session = client.login(&email, &senha).await?;
            print_json(&session)
        }
        Commands::Logout => {
            client.logout()?;
            println!("logged out");
            Ok(())
        }
        Commands::Whoami => match client.current_user() {
            Some(user) => print_json(&user),
            None => Err(anyhow!("no user is logged in")),
        },
        Commands::List => {
            let fetched = client.list_demands().await?;
            print_fetched(&fetched)
        }
        Commands::Create(args) => {
            let draft = DemandDraft {
                titulo: args.titulo,
                descricao: args.descricao,
                escolas: args.escolas,
                responsavel: args.responsavel,
                prazo: Some(args.prazo),
                prioridade: args.prioridade,
            };
            let fetched = client.create_demand(draft).await?;
            print_fetched(&fetched)
        }
        Commands::Update(args) => {
            let updated = client.update_demand(&args.id, args.patch()).await?;
            match updated {
                Some(demand) => print_json(&demand),
                None => {
                    println!("updated {}", args.id.trim());
                    Ok(())
                }
            }
        }
        Commands::Pending => print_json(&client.pending_sync()?),
        Commands::Sync => {
            let report = client.sync_pending().await?;
            for (local, remote) in &report.synced {
                println!("synced {local} -> {remote}");
            }
            for (local, reason) in &report.failed {
                println!("failed {local}: {reason}");
            }
            for local in &report.unconfirmed {
                println!("sent {local}; backend id unknown until the next list");
            }
            Ok(())
        }
        Commands::Stats => match client.cached_stats()? {
            Some(stats) => print_json(&stats),
            None => Err(anyhow!("no statistics yet; run `demandas list` first")),
        },
        Commands::Upload {
            path,
            mime,
            demanda,
        } => {
            let bytes =
                std::fs::read(&path).with_context(|| format!("read {}", path.display()))?;
            let nome = path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| anyhow!("{} has no usable file name", path.display()))?;
            let uploaded = client
                .upload_file(
                    nome,
                    mime.as_deref().unwrap_or_default(),
                    &bytes,
                    demanda.as_deref(),
                )
                .await?;
            println!("{}", uploaded.url);
            Ok(())
        }
        Commands::Email {
            para,
            assunto,
            mensagem,
        } => {
            client.send_email(&para, &assunto, &mensagem).await?;
            println!("sent to {para}");
            Ok(())
        }
        Commands::Notify { id } => {
            let demand = client
                .cache()
                .load_demands()?
                .unwrap_or_default()
                .into_iter()
                .find(|demand| demand.id == id)
                .ok_or_else(|| anyhow!("demand {id} is not cached; run `demandas list` first"))?;
            client.notify_demand(&demand).await?;
            println!("notified {}", demand.id);
            Ok(())
        }
        Commands::Subscribe { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("read {}", file.display()))?;
            let subscription: PushSubscription = serde_json::from_str(&raw)
                .with_context(|| format!("parse push subscription {}", file.display()))?;
            client.save_push_subscription(&subscription).await?;
            println!("subscription saved");
            Ok(())
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_fetched<T: Serialize>(fetched: &Fetched<T>) -> anyhow::Result<()> {
    print_json(&Listing {
        offline: fetched.is_offline(),
        items: &fetched.value,
    })
}
