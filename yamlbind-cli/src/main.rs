//! `yamlbind` command-line front end.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use log::LevelFilter;
use yamlbind_core::{free, load_file, save_data, save_file, Config, Heap, Schema, Settings};

/// Load YAML documents into schema-described memory and write them back.
#[derive(Parser, Debug)]
#[command(name = "yamlbind", author, version, long_about = None)]
struct Args {
    /// More log output (repeat for debug and trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a document and report whether it fits the schema
    Check {
        /// Schema file (.toml or .json)
        #[arg(short, long)]
        schema: PathBuf,
        input: PathBuf,
    },
    /// Load a document and write it back out in normalized form
    Fmt {
        /// Schema file (.toml or .json)
        #[arg(short, long)]
        schema: PathBuf,
        input: PathBuf,
        /// Write here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{}: {message}", .path.display())]
    Schema { path: PathBuf, message: String },
    #[error("{}: {source}", .path.display())]
    Engine {
        path: PathBuf,
        source: yamlbind_core::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

fn init_logging(level: LevelFilter) {
    use simplelog::{ColorChoice, TermLogger, TerminalMode};

    if let Err(err) = TermLogger::init(
        level,
        simplelog::Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ) {
        eprintln!("yamlbind: logging unavailable: {}", err);
    }
}

/// Each `-v` raises the configured level by one step, up to trace.
fn verbosity(base: LevelFilter, verbose: u8) -> LevelFilter {
    let raised = match verbose {
        0 => return base,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    base.max(raised)
}

fn load_schema(path: &Path) -> Result<Schema, CliError> {
    let schema_error = |message: String| CliError::Schema {
        path: path.to_path_buf(),
        message,
    };
    let text = std::fs::read_to_string(path).map_err(|e| schema_error(e.to_string()))?;
    let schema: Schema = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_str(&text).map_err(|e| schema_error(e.to_string()))?,
        _ => toml::from_str(&text).map_err(|e| schema_error(e.to_string()))?,
    };
    log::debug!("loaded {} schema from {}", schema.kind.name(), path.display());
    Ok(schema)
}

fn run(command: &Command, config: &Config, out: &mut impl Write) -> Result<(), CliError> {
    match command {
        Command::Check { schema, input } => {
            let schema = load_schema(schema)?;
            let mut heap = Heap::new();
            let loaded = load_file(input, config, &mut heap, &schema).map_err(|source| {
                CliError::Engine {
                    path: input.clone(),
                    source,
                }
            })?;
            free(config, &mut heap, &schema, loaded.data, loaded.seq_count);
            log::info!("{}: {:?}", input.display(), heap.stats());
            writeln!(out, "{}: ok", input.display())?;
            Ok(())
        }
        Command::Fmt {
            schema,
            input,
            output,
        } => {
            let schema = load_schema(schema)?;
            let mut heap = Heap::new();
            let loaded = load_file(input, config, &mut heap, &schema).map_err(|source| {
                CliError::Engine {
                    path: input.clone(),
                    source,
                }
            })?;
            let saved = match output {
                Some(path) => save_file(path, config, &heap, &schema, loaded.data, loaded.seq_count)
                    .map_err(|source| CliError::Engine {
                        path: path.clone(),
                        source,
                    }),
                None => save_data(config, &heap, &schema, loaded.data, loaded.seq_count)
                    .map_err(|source| CliError::Engine {
                        path: input.clone(),
                        source,
                    })
                    .and_then(|text| out.write_all(text.as_bytes()).map_err(CliError::from)),
            };
            free(config, &mut heap, &schema, loaded.data, loaded.seq_count);
            saved
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let settings = Settings::load();
    let level = verbosity(settings.log_level(), args.verbose);
    init_logging(level);
    log::info!("yamlbind {} (log level: {:?})", yamlbind_core::VERSION, level);

    let config = settings.config().with_log_level(level);
    match run(&args.command, &config, &mut io::stdout().lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("yamlbind: {}", err);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use yamlbind_core::ConfigFlags;

    const PAIR_TOML: &str = r#"
type = "mapping"
data_size = 8
flags = { pointer = true }

[[fields]]
key = "a"
offset = 0
value = { type = "int", data_size = 4 }

[[fields]]
key = "tags"
offset = 4
value = { type = "flags", data_size = 1, values = [{ name = "x", value = 1 }, { name = "y", value = 2 }] }
"#;

    fn workspace(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, contents) in files {
            std::fs::write(dir.path().join(name), contents).unwrap();
        }
        dir
    }

    #[test]
    fn args_are_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn parse_fmt_with_global_verbose() {
        let args = Args::try_parse_from([
            "yamlbind", "fmt", "-s", "s.toml", "in.yaml", "-o", "out.yaml", "-vv",
        ])
        .unwrap();
        assert_eq!(args.verbose, 2);
        match args.command {
            Command::Fmt { schema, output, .. } => {
                assert_eq!(schema, PathBuf::from("s.toml"));
                assert_eq!(output, Some(PathBuf::from("out.yaml")));
            }
            other => panic!("expected fmt, got {:?}", other),
        }
        assert!(Args::try_parse_from(["yamlbind", "check", "in.yaml"]).is_err());
    }

    #[test]
    fn verbosity_only_raises() {
        assert_eq!(verbosity(LevelFilter::Warn, 0), LevelFilter::Warn);
        assert_eq!(verbosity(LevelFilter::Warn, 1), LevelFilter::Info);
        assert_eq!(verbosity(LevelFilter::Debug, 1), LevelFilter::Debug);
        assert_eq!(verbosity(LevelFilter::Off, 5), LevelFilter::Trace);
    }

    #[test]
    fn check_reports_ok_and_errors() {
        let dir = workspace(&[
            ("pair.toml", PAIR_TOML),
            ("good.yaml", "a: 1\ntags: [x]\n"),
            ("bad.yaml", "a: 1\ntags: [x]\nc: 3\n"),
        ]);
        let config = Config::default();
        let mut out = Vec::new();
        let check = |input: &str| Command::Check {
            schema: dir.path().join("pair.toml"),
            input: dir.path().join(input),
        };

        run(&check("good.yaml"), &config, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().ends_with("good.yaml: ok\n"));

        let err = run(&check("bad.yaml"), &config, &mut Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            CliError::Engine {
                source: yamlbind_core::Error::InvalidKey,
                ..
            }
        ));
    }

    #[test]
    fn fmt_to_stdout_and_file() {
        let dir = workspace(&[("pair.toml", PAIR_TOML), ("in.yaml", "tags: [y, x]\na: -2\n")]);
        let config = Config::new(ConfigFlags {
            style_flow: true,
            ..ConfigFlags::default()
        });
        let mut out = Vec::new();
        let fmt = Command::Fmt {
            schema: dir.path().join("pair.toml"),
            input: dir.path().join("in.yaml"),
            output: None,
        };
        run(&fmt, &config, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "{a: -2, tags: [x, y]}\n");

        let target = dir.path().join("out.yaml");
        let fmt = Command::Fmt {
            schema: dir.path().join("pair.toml"),
            input: dir.path().join("in.yaml"),
            output: Some(target.clone()),
        };
        run(&fmt, &Config::default(), &mut Vec::new()).unwrap();
        assert_eq!(std::fs::read_to_string(target).unwrap(), "a: -2\ntags:\n- x\n- y\n");
    }

    #[test]
    fn json_schema_and_schema_errors() {
        let json = r#"{"type": "sequence", "entry": {"type": "uint", "data_size": 2},
                       "min": 1, "flags": {"pointer": true}}"#;
        let dir = workspace(&[("list.json", json), ("list.yaml", "[1, 2]"), ("broken.toml", "type = ")]);
        let mut out = Vec::new();
        let fmt = Command::Fmt {
            schema: dir.path().join("list.json"),
            input: dir.path().join("list.yaml"),
            output: None,
        };
        run(&fmt, &Config::default(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "- 1\n- 2\n");

        let check = Command::Check {
            schema: dir.path().join("broken.toml"),
            input: dir.path().join("list.yaml"),
        };
        let err = run(&check, &Config::default(), &mut Vec::new()).unwrap_err();
        assert!(matches!(err, CliError::Schema { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }
}
