use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use trails_client::{
    ClientConfig, Controller, FormData, HttpGenerator, InFlightPolicy, MemoryView, SubmitOutcome,
    Variant,
};

#[derive(Parser)]
#[command(
    name = "trails-client",
    version,
    about = "Request trail images from a generation service"
)]
struct Cli {
    /// Service base URL (defaults to $TRAILS_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Give up on a request after this many seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    #[arg(long, global = true, value_enum)]
    variant: Option<Variant>,

    /// What a submission does while another is pending
    #[arg(long, global = true, value_enum)]
    policy: Option<InFlightPolicy>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Request one image and save it
    Generate(GenerateArgs),
    /// Read submissions from stdin, one per line
    Session(SessionArgs),
    /// Request one image and print it as a data URL
    DataUrl(FieldArgs),
}

/// Raw form fields; blank or missing values take the defaults.
#[derive(Args)]
struct FieldArgs {
    #[arg(short, long)]
    seed: Option<String>,
    #[arg(short, long)]
    min_leaf_size: Option<String>,
    #[arg(short, long)]
    canvas_size: Option<String>,
    #[arg(short, long)]
    density: Option<String>,
}

impl FieldArgs {
    fn form(&self) -> FormData {
        [
            ("seed", &self.seed),
            ("minLeafSize", &self.min_leaf_size),
            ("canvasSize", &self.canvas_size),
            ("density", &self.density),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_ref().map(|v| (name, v.as_str())))
        .collect()
    }
}

#[derive(Args)]
struct GenerateArgs {
    #[command(flatten)]
    fields: FieldArgs,
    /// Directory to save the image in
    #[arg(short, long, default_value = ".")]
    out: PathBuf,
}

#[derive(Args)]
struct SessionArgs {
    /// Directory for `download`
    #[arg(short, long, default_value = ".")]
    out: PathBuf,
}

type HttpController = Controller<HttpGenerator, MemoryView>;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let timeout = cli.timeout_secs.map(Duration::from_secs);
    let mut config = ClientConfig::from_env().with_timeout(timeout);
    if let Some(url) = cli.base_url {
        config = config.with_base_url(url);
    }
    if let Some(variant) = cli.variant {
        config = config.with_variant(variant);
    }
    if let Some(policy) = cli.policy {
        config = config.with_policy(policy);
    }

    let generator = HttpGenerator::new(&config);
    tracing::debug!(url = generator.url(), "using generation service");
    let controller = Controller::new(generator, Arc::new(MemoryView::new()), &config);

    let result = match cli.command {
        Commands::Generate(args) => generate(&controller, &args).await,
        Commands::DataUrl(fields) => data_url(&controller, &fields).await,
        Commands::Session(args) => session(&controller, &args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("Error: {}", message);
            ExitCode::FAILURE
        }
    }
}

async fn submit_once(controller: &HttpController, form: &FormData) -> Result<(), String> {
    match controller.submit(form).await.map_err(|e| e.to_string())? {
        SubmitOutcome::Rendered { .. } | SubmitOutcome::Unchanged => Ok(()),
        other => Err(format!("image generation did not complete ({:?})", other)),
    }
}

async fn generate(controller: &HttpController, args: &GenerateArgs) -> Result<(), String> {
    submit_once(controller, &args.fields.form()).await?;
    let path = controller.download(&args.out).map_err(|e| e.to_string())?;
    println!("{}", path.display());
    Ok(())
}

async fn data_url(controller: &HttpController, fields: &FieldArgs) -> Result<(), String> {
    submit_once(controller, &fields.form()).await?;
    let url = controller.data_url().ok_or("service returned an empty image")?;
    println!("{}", url);
    Ok(())
}

async fn session(controller: &HttpController, args: &SessionArgs) -> Result<(), String> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.map_err(|e| e.to_string())? {
        let line = line.trim();
        match line {
            "" => continue,
            "quit" | "exit" => break,
            "download" => match controller.download(&args.out) {
                Ok(path) => println!("saved {}", path.display()),
                Err(err) => println!("download failed: {}", err),
            },
            "data-url" => match controller.data_url() {
                Some(url) => println!("{}", url),
                None => println!("nothing rendered"),
            },
            submission => {
                let form = FormData::parse_line(submission);
                match controller.submit(&form).await {
                    Ok(SubmitOutcome::Rendered { bytes }) => println!("rendered {} bytes", bytes),
                    Ok(SubmitOutcome::Unchanged) => println!("unchanged"),
                    Ok(SubmitOutcome::Failed) => println!("failed"),
                    Ok(SubmitOutcome::Superseded) => println!("superseded"),
                    Ok(SubmitOutcome::Busy) => println!("busy"),
                    Err(err) => println!("invalid: {}", err),
                }
            }
        }
    }
    Ok(())
}
