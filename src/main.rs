//! Zeus - Athena query execution with a run ledger.

use std::path::Path;
use std::sync::Arc;

use aws_config::{BehaviorVersion, Region};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use zeus::athena::{AthenaClient, ExecutionHandle};
use zeus::cli::{Cli, Command, ExecuteArgs};
use zeus::client::ZeusClient;
use zeus::config::Config;
use zeus::error::{Result, ZeusError};
use zeus::ledger::Ledger;
use zeus::logging;
use zeus::objects::S3ObjectStore;
use zeus::output::{self, OutputFormat};
use zeus::query::{PageRequest, QueryService};

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse_args();

    match cli.log_path() {
        Some(path) => logging::init_file_logging(&path),
        None => logging::init_stderr_logging(),
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cli)) {
        error!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Serve { ref host, port } => {
            let config_path = cli.config_path();
            info!("Loading config from: {}", config_path.display());
            let mut config = Config::load_from_file(&config_path)?;
            config.apply_env_defaults();
            if let Some(host) = host {
                config.server.host = host.clone();
            }
            if port.is_some() {
                config.server.port = port;
            }
            serve(config).await
        }
        Command::Execute(ref args) => execute(&client(&cli)?, args).await,
        Command::Runs {
            ref query_id,
            format,
        } => {
            let id = parse_uuid(query_id)?;
            let runs = client(&cli)?.list_runs(id).await?;
            match format {
                OutputFormat::Text => println!("{}", output::format_runs(&runs)),
                OutputFormat::Json => println!("{}", output::to_json(&runs)),
            }
            Ok(())
        }
        Command::Results {
            ref execution_id,
            page,
            size,
            format,
        } => {
            let request = PageRequest::new(page, size)?;
            let handle = ExecutionHandle::new(execution_id.as_str());
            let page = client(&cli)?.results(&handle, request).await?;
            match format {
                OutputFormat::Text => println!("{}", output::format_result_page(&page)),
                OutputFormat::Json => println!("{}", output::to_json(&page)),
            }
            Ok(())
        }
        Command::Export {
            ref execution_id,
            ref output,
        } => {
            let handle = ExecutionHandle::new(execution_id.as_str());
            export(&client(&cli)?, &handle, output.as_deref()).await
        }
    }
}

fn client(cli: &Cli) -> Result<ZeusClient> {
    ZeusClient::new(cli.server.as_str())
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ZeusError::validation(format!("Invalid query ID: {raw}")))
}

/// Runs the HTTP API against Athena and S3 until Ctrl-C.
async fn serve(config: Config) -> Result<()> {
    let output_location = config.athena.output_location()?;

    let sdk_config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.athena.region().to_string()))
        .load()
        .await;
    let athena = AthenaClient::from_sdk_config(&sdk_config, config.athena.workgroup());
    let objects = S3ObjectStore::from_sdk_config(&sdk_config);

    let ledger = match &config.ledger.path {
        Some(path) => Ledger::open(path).await?,
        None => Ledger::open_default().await?,
    };
    if let Some(path) = ledger.path() {
        info!("Run ledger: {}", path.display());
    }
    info!(
        "Athena workgroup '{}' in {}, results to {}",
        config.athena.workgroup(),
        config.athena.region(),
        output_location
    );

    let service = Arc::new(QueryService::new(
        Arc::new(athena),
        Arc::new(objects),
        ledger.clone(),
        output_location,
    ));

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            signal.cancel();
        }
    });

    let result = zeus::api::start_server(service, &config.server, shutdown).await;
    ledger.close().await;
    result
}

async fn execute(client: &ZeusClient, args: &ExecuteArgs) -> Result<()> {
    let request = args.to_request()?;

    match &args.query {
        Some(query_id) => {
            let run = client
                .execute_definition(parse_uuid(query_id)?, &request)
                .await?;
            println!("Execution ID: {}", run.execution_id);
            println!("Run ID: {}", run.id);
        }
        None => {
            let response = client.execute(&request).await?;
            println!("Execution ID: {}", response.execution_id);
            println!("Run ID: {}", response.run_id);
        }
    }
    Ok(())
}

/// Streams the exported CSV to a file or stdout.
async fn export(client: &ZeusClient, handle: &ExecutionHandle, path: Option<&Path>) -> Result<()> {
    let mut body = client.export(handle).await?;
    let mut writer: Box<dyn tokio::io::AsyncWrite + Unpin + Send> = match path {
        Some(path) => Box::new(tokio::fs::File::create(path).await.map_err(|e| {
            ZeusError::internal(format!("Failed to create {}: {e}", path.display()))
        })?),
        None => Box::new(tokio::io::stdout()),
    };

    let mut written: u64 = 0;
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| ZeusError::internal(format!("Failed to write export: {e}")))?;
        written += chunk.len() as u64;
    }
    writer
        .flush()
        .await
        .map_err(|e| ZeusError::internal(format!("Failed to write export: {e}")))?;

    if let Some(path) = path {
        info!("Wrote {written} bytes to {}", path.display());
    }
    Ok(())
}
