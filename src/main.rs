use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clipmix::config::AppConfig;
use clipmix::naming::daily_output_path;
use clipmix::overlay::OverlayPlanner;
use clipmix::renderer::{CancellationToken, FfprobeProbe, ProcessRunner, RenderEngine};
use clipmix::templates::{ScriptTemplate, TemplateType};
use clipmix::ScriptParser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "clipmix")]
#[command(about = "Ad video mixer: cuts media pools to narration with ffmpeg", long_about = None)]
struct Cli {
    /// Log renderer invocations
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one or more videos from a job file
    Render {
        #[arg(value_name = "JOB")]
        job: PathBuf,

        /// Configuration file (defaults to ./clipmix.toml if present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory for finished videos
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Seed for reproducible selection
        #[arg(long)]
        seed: Option<u64>,

        /// Number of videos to render
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
    },
    /// Show which assets a job would use without rendering
    Plan {
        #[arg(value_name = "JOB")]
        job: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print the text overlay schedule and filter for a video length
    Overlays {
        /// Video length in seconds
        #[arg(short, long)]
        duration: f64,

        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Seconds between overlay starts
        #[arg(long)]
        frequency: Option<f64>,

        /// Seconds each overlay stays visible
        #[arg(long)]
        show_duration: Option<f64>,

        #[arg(long)]
        seed: Option<u64>,
    },
    /// Generate a job template
    Template {
        /// Type of template to generate
        #[arg(value_enum)]
        #[arg(name = "type")]
        template_type: TemplateType,

        /// Number of scenes
        #[arg(short, long, default_value_t = 3)]
        scenes: usize,
    },
    /// Print the next free output file name
    NextName {
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        #[arg(short, long)]
        prefix: Option<String>,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "clipmix=debug" } else { "clipmix=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    AppConfig::load(path).context("Failed to load configuration")
}

fn rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn ensure_renderer(config: &AppConfig) -> Result<()> {
    let tools = config.renderer.tools();
    for program in [&tools.ffmpeg, &tools.ffprobe] {
        if !ProcessRunner::is_available(program) {
            anyhow::bail!("'{}' not found; install ffmpeg or set renderer paths in the configuration", program);
        }
    }
    Ok(())
}

/// Cancel in-flight renderer invocations on Ctrl-C instead of leaving
/// ffmpeg children behind.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::warn!("Ctrl-C handler unavailable: {}", e);
                return;
            }
        };
        runtime.block_on(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, stopping renderer");
                trigger.cancel();
            }
        });
    });
    token
}

fn process_runner(config: &AppConfig) -> Result<ProcessRunner> {
    let runner = ProcessRunner::new(config.renderer.timeout())
        .context("Failed to start the renderer runtime")?;
    Ok(runner.with_cancel_token(cancel_on_ctrl_c()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Template {
            template_type,
            scenes,
        } => {
            let script = ScriptTemplate::generate(template_type, scenes);
            println!("{}", serde_json::to_string_pretty(&script)?);
        }

        Commands::NextName {
            output_dir,
            prefix,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            let dir = output_dir.unwrap_or(config.renderer.output_dir);
            let prefix = prefix.or(config.renderer.prefix);
            println!("{}", daily_output_path(&dir, prefix.as_deref())?.display());
        }

        Commands::Overlays {
            duration,
            config,
            frequency,
            show_duration,
            seed,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(frequency) = frequency {
                config.overlay.frequency = frequency;
            }
            if let Some(show) = show_duration {
                config.overlay.duration = show;
            }
            config
                .validate()
                .context("Invalid overlay options")?;
            if !duration.is_finite() || duration < 0.0 {
                anyhow::bail!("video length must be a non-negative number of seconds, got {}", duration);
            }
            let target = config.target()?;
            let planner = OverlayPlanner::new(&config.overlay);
            let intervals = planner.plan(duration, &mut rng(seed));

            println!("📝 {} overlays in {:.2}s", intervals.len(), duration);
            for interval in &intervals {
                println!(
                    "  {:>7.2}s - {:>7.2}s  {} / {}{}",
                    interval.start,
                    interval.end,
                    interval.main_text,
                    interval.sub_text,
                    interval
                        .placement
                        .preset
                        .as_deref()
                        .map(|p| format!("  [{}]", p))
                        .unwrap_or_default()
                );
            }
            if let Some(filter) = planner.filter(&intervals, target.width, target.height) {
                println!("\n{}", filter);
            }
        }

        Commands::Plan { job, config, seed } => {
            let config = load_config(config.as_deref())?;
            let script = ScriptParser::parse(&job)?;
            ensure_renderer(&config)?;
            println!("📋 Job Summary:");
            println!("{}", ScriptParser::summarize(&script));

            let runner = process_runner(&config)?;
            let probe = FfprobeProbe::new(&runner, config.renderer.tools());
            let engine = RenderEngine::new(&config, &runner, &probe);

            println!("🎨 Media pools:");
            for (id, stats) in engine.pool_stats(&script)? {
                println!("  {}: {}", id, stats);
            }

            let plan = engine
                .plan(&script, &mut rng(seed))
                .context("Failed to sequence scenes")?;
            println!("\n🎞️  Selection ({} clips):", plan.clip_count());
            print!("{}", plan);
        }

        Commands::Render {
            job,
            config,
            output_dir,
            seed,
            count,
        } => {
            println!("🎬 clipmix\n");
            let config = load_config(config.as_deref())?;
            let script = ScriptParser::parse(&job)?;
            ensure_renderer(&config)?;
            println!("📋 Job Summary:");
            println!("{}", ScriptParser::summarize(&script));

            let runner = process_runner(&config)?;
            let probe = FfprobeProbe::new(&runner, config.renderer.tools());
            let engine = RenderEngine::new(&config, &runner, &probe);
            let output_dir = output_dir.unwrap_or_else(|| config.renderer.output_dir.clone());

            let videos = engine
                .render(&script, &output_dir, count, &mut rng(seed))
                .with_context(|| format!("Failed to render {}", job.display()))?;

            for video in &videos {
                let mut extras = Vec::new();
                if video.overlay_applied {
                    extras.push("text");
                }
                if video.background_applied {
                    extras.push("music");
                }
                println!(
                    "✅ {} ({:.2}s{})",
                    video.path.display(),
                    video.duration,
                    if extras.is_empty() {
                        String::new()
                    } else {
                        format!(", {}", extras.join(" + "))
                    }
                );
            }
            println!("\n✨ Video created successfully ({} total)", videos.len());
        }
    }

    Ok(())
}
