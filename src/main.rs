//! mpack CLI
//!
//! Entry point for the `mpack` command-line tool.

use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Parser, Subcommand};
use model_packager::config::{
    default_project_config_path, default_user_config_path, EffectiveConfig,
};
use model_packager::fallback::package_name_for;
use model_packager::{
    BuildTool, ExitCode, FallbackPackager, Interrupt, Output, PackagerConfig, PackagingRequest,
    Pipeline,
};
use mpack_framework::detect_with_table;
use mpack_runtime::{loader_for, Model, ModelLoader, ScriptRunner};
use serde_json::json;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "mpack")]
#[command(about = "Package ML models into container images or portable archives", version)]
#[command(after_help = "Examples:\n  mpack package -i resnet18_full.pth -t my_ai_model:1.0\n  mpack package --input model.h5 --image ml_model:latest --no-build-tool")]
struct Cli {
    /// Verbose output (-v streams build output and info logs, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Project config file (default: ./mpack.toml when present)
    #[arg(long, short = 'c', global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory for the build context, build log, summary and packages
    #[arg(long, global = true, value_name = "DIR")]
    work_dir: Option<PathBuf>,

    /// Build tool executable (default: docker)
    #[arg(long, global = true, value_name = "PROGRAM")]
    tool: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Package a model into a container image (or a portable archive)
    Package {
        /// Path to the model file (e.g. resnet18_full.pth, my_model.h5)
        #[arg(long = "input", short = 'i', value_name = "PATH")]
        input: PathBuf,

        /// Image name and tag (e.g. my_ai_model:1.0)
        #[arg(long = "image", short = 't', value_name = "NAME:TAG")]
        image: String,

        /// Framework: auto, pytorch or tensorflow
        #[arg(long, default_value = "auto")]
        framework: String,

        /// Build timeout in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Skip the build tool and create a portable package
        #[arg(long)]
        no_build_tool: bool,

        /// Push the image after a successful build
        #[arg(long)]
        push: bool,

        /// Registry prefix prepended to the image name
        #[arg(long, value_name = "PREFIX")]
        registry: Option<String>,
    },

    /// Check whether the build tool's daemon is reachable
    Probe {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Create a portable package without touching the build tool
    Fallback {
        /// Path to the model file
        #[arg(long = "input", short = 'i', value_name = "PATH")]
        input: PathBuf,

        /// Package name (without extension)
        #[arg(long = "name", short = 'n')]
        name: String,

        /// Framework: auto, pytorch or tensorflow
        #[arg(long, default_value = "auto")]
        framework: String,
    },

    /// Run the inference entry point on a model
    Infer {
        /// Path to the model file
        #[arg(long, value_name = "PATH")]
        model: PathBuf,

        /// Input image (default: synthetic input)
        #[arg(long, value_name = "PATH")]
        test_input: Option<PathBuf>,

        /// Framework: auto, pytorch or tensorflow
        #[arg(long, default_value = "auto")]
        framework: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show the framework and dependency manifest chosen for a model
    Detect {
        /// Path to the model file
        model: PathBuf,

        /// Framework override
        #[arg(long, default_value = "auto")]
        framework: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match cli.command {
        Commands::Package {
            ref input,
            ref image,
            ref framework,
            timeout,
            no_build_tool,
            push,
            ref registry,
        } => run_package(
            &cli,
            input,
            image,
            framework,
            timeout,
            no_build_tool,
            push,
            registry.clone(),
        ),
        Commands::Probe { json } => run_probe(&cli, json),
        Commands::Fallback {
            ref input,
            ref name,
            ref framework,
        } => run_fallback(&cli, input, name, framework),
        Commands::Infer {
            ref model,
            ref test_input,
            ref framework,
            json,
        } => run_infer(&cli, model, test_input.as_deref(), framework, json),
        Commands::Detect {
            ref model,
            ref framework,
            json,
        } => run_detect(&cli, model, framework, json),
    };

    process::exit(code.as_i32());
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Merge builtin, user, project and CLI layers.
fn load_config(
    cli: &Cli,
    timeout: Option<u64>,
) -> Result<(PackagerConfig, EffectiveConfig), ExitCode> {
    let user = default_user_config_path();
    let project = match cli.config {
        Some(ref path) => Some(path.clone()),
        None => Some(default_project_config_path()).filter(|p| p.exists()),
    };
    let overrides = json!({
        "work_dir": cli.work_dir,
        "tool": cli.tool,
        "timeouts": { "build_secs": timeout },
    });

    PackagerConfig::load(user.as_deref(), project.as_deref(), Some(overrides)).map_err(|e| {
        eprintln!("Error loading config: {}", e);
        ExitCode::Validation
    })
}

#[allow(clippy::too_many_arguments)]
fn run_package(
    cli: &Cli,
    input: &Path,
    image: &str,
    framework: &str,
    timeout: Option<u64>,
    no_build_tool: bool,
    push: bool,
    registry: Option<String>,
) -> ExitCode {
    let (config, effective) = match load_config(cli, timeout) {
        Ok(c) => c,
        Err(code) => {
            println!("RESULT: failed artifact={} exit={}", image, code.as_i32());
            return code;
        }
    };

    let request = match PackagingRequest::builder(input, image)
        .framework(framework)
        .build_timeout(config.timeouts.build())
        .verbose(cli.verbose > 0)
        .disable_build_tool(no_build_tool)
        .push(push)
        .registry(registry)
        .build()
    {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            println!("RESULT: failed artifact={} exit={}", image, ExitCode::Validation.as_i32());
            return ExitCode::Validation;
        }
    };

    let interrupt = Interrupt::new();
    if let Err(e) = interrupt.install() {
        tracing::warn!(error = %e, "could not install interrupt handler");
    }

    let mut pipeline =
        Pipeline::new(config, interrupt, Output::stdout()).with_config_sources(effective.sources);
    match pipeline.run(&request) {
        Ok(summary) => summary.exit_code_enum().unwrap_or(ExitCode::Failure),
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

fn run_probe(cli: &Cli, json: bool) -> ExitCode {
    let (config, _) = match load_config(cli, None) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let tool = BuildTool::from_config(&config);
    let availability = tool.probe(config.timeouts.probe());

    if json {
        match serde_json::to_string_pretty(&availability) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("Error serializing result: {}", e);
                return ExitCode::Failure;
            }
        }
    } else if availability.available {
        println!("{}: available", tool.program());
    } else {
        println!("{}: unavailable ({})", tool.program(), availability.diagnostic);
    }

    if availability.available {
        ExitCode::Success
    } else {
        ExitCode::Failure
    }
}

fn run_fallback(cli: &Cli, input: &Path, name: &str, framework: &str) -> ExitCode {
    let (config, _) = match load_config(cli, None) {
        Ok(c) => c,
        Err(code) => return code,
    };
    if !input.is_file() {
        eprintln!("Error: model file not found: {}", input.display());
        return ExitCode::Validation;
    }
    let package_name = package_name_for(name);
    if package_name.is_empty() {
        eprintln!("Error: package name must not be empty");
        return ExitCode::Validation;
    }

    let table = config.profile_table();
    let detected = detect_with_table(input, Some(framework), &table);
    let packager = FallbackPackager::from_config(&config);

    match packager.package(input, &package_name, table.profile(detected)) {
        Ok(archive) => {
            println!("Created package: {}", archive.display());
            println!("Package contents: {}", packager.package_dir(&package_name).display());
            println!();
            println!("To use:");
            println!("   1. Extract {}", archive.display());
            println!("   2. Run: python run.py (Unix/Mac/Linux)");
            println!("   3. Or: run.bat (Windows)");
            ExitCode::Success
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::Failure
        }
    }
}

fn run_infer(
    cli: &Cli,
    model: &Path,
    test_input: Option<&Path>,
    framework: &str,
    json: bool,
) -> ExitCode {
    let (config, _) = match load_config(cli, None) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let table = config.profile_table();
    let detected = detect_with_table(model, Some(framework), &table);
    let runner = ScriptRunner::new(config.interpreter.clone(), config.entry_point_path());
    let loader = loader_for(detected, runner);

    let result = loader
        .load_model(model)
        .and_then(|loaded| loaded.predict(test_input));

    match result {
        Ok(predictions) => {
            if json {
                match serde_json::to_string_pretty(&predictions) {
                    Ok(s) => println!("{}", s),
                    Err(e) => {
                        eprintln!("Error serializing result: {}", e);
                        return ExitCode::Failure;
                    }
                }
            } else {
                println!("Framework: {}", detected.display_name());
                println!("{}", predictions.to_human());
            }
            ExitCode::Success
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::Failure
        }
    }
}

fn run_detect(cli: &Cli, model: &Path, framework: &str, json: bool) -> ExitCode {
    let (config, _) = match load_config(cli, None) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let table = config.profile_table();
    let detected = detect_with_table(model, Some(framework), &table);
    let profile = table.profile(detected);

    if json {
        match serde_json::to_string_pretty(profile) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("Error serializing result: {}", e);
                return ExitCode::Failure;
            }
        }
    } else {
        println!("Framework: {} ({})", detected.display_name(), detected);
        println!("requirements.txt:");
        print!("{}", profile.manifest());
    }
    ExitCode::Success
}
