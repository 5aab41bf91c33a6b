mod audio;
mod config;
mod dialogue;
mod pipeline;
mod render;
mod resume;
mod speech;
mod web;

use anyhow::Context;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use structopt::StructOpt;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::dialogue::JobLevel;
use crate::dialogue::groq::GroqClient;
use crate::pipeline::{FeedbackRequest, Pipeline};
use crate::render::RenderTarget;
use crate::speech::google::GoogleTranslateTts;

#[derive(Deserialize, Debug)]
struct Environment {
    groq_api_key: String,
}

#[derive(StructOpt, Debug)]
#[structopt(
    name = "resume-feedback-to-audio",
    about = "Turn a resume into spoken feedback from a panel of HR executives"
)]
struct Args {
    /// Path to a TOML configuration file (voices, model, output)
    #[structopt(short = "c", long)]
    config: Option<PathBuf>,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt, Debug)]
enum Command {
    /// Serve the upload form over HTTP
    Serve {
        /// Address to listen on
        #[structopt(short, long, default_value = "127.0.0.1:8501")]
        listen: SocketAddr,
    },
    /// Generate feedback for one resume file
    Roast {
        /// Resume to critique (PDF or DOCX)
        #[structopt(short, long)]
        resume: PathBuf,

        /// Job role the candidate is applying for
        #[structopt(short = "j", long)]
        role: String,

        /// Job level (beginner, intermediate or advanced)
        #[structopt(short, long, default_value = "Beginner")]
        level: JobLevel,

        /// Where to write the combined audio, overriding the configuration
        #[structopt(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}=info", env!("CARGO_CRATE_NAME")))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::from_args();
    let environment = envy::from_env::<Environment>()
        .context("GROQ_API_KEY environment variable not set")?;

    let mut config = Config::load(args.config.as_deref()).await?;
    if let Command::Roast {
        output: Some(output),
        ..
    } = &args.command
    {
        config.output.path = output.clone();
    }

    let pipeline = Arc::new(build_pipeline(&config, environment.groq_api_key)?);

    match args.command {
        Command::Serve { listen } => {
            web::serve(listen, web::AppState { pipeline }).await?;
        }
        Command::Roast {
            resume,
            role,
            level,
            ..
        } => {
            let file_name = resume
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let request = FeedbackRequest {
                resume,
                file_name,
                role,
                level,
            };

            let feedback = pipeline.run(&request).await?;

            println!("{}", feedback.dialogue);
            println!();
            println!(
                "Combined audio feedback saved as {} ({} lines, {:.1}s of audio).",
                feedback.audio.output.display(),
                feedback.audio.segments,
                feedback.audio.duration.as_secs_f64()
            );
            println!(
                "Time taken for feedback generation: {:.2} seconds",
                feedback.elapsed.as_secs_f64()
            );
        }
    }

    Ok(())
}

fn build_pipeline(config: &Config, api_key: String) -> anyhow::Result<Pipeline> {
    let voices = config.voice_table()?;
    let speakers = voices.speakers().map(str::to_owned).collect();

    let generator = GroqClient::new(config.generator.clone(), api_key, speakers);
    let synthesizer = GoogleTranslateTts::new(config.speech.endpoint.clone())?;
    let target = RenderTarget {
        output: config.output.path.clone(),
        format: config.output.format,
        bitrate_kbps: config.output.bitrate_kbps,
        scratch_dir: config.output.scratch_dir(),
    };

    Ok(Pipeline::new(
        Arc::new(generator),
        Arc::new(synthesizer),
        voices,
        target,
    ))
}
