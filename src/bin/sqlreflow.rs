//! Command-line interface for sqlreflow
//! A developer tool for inspecting how the engine parses and reindents SQL files.
//!
//! Usage:
//!   sqlreflow parse `<path>` [--format `<format>`] [--code-only]  - Print the parse tree
//!   sqlreflow reindent `<path>` [--check]                       - Print the reindented file
//!   sqlreflow list-dialects                                   - List bundled dialects
//!
//! Every subcommand accepts `--config <file>`, layered over the built-in
//! defaults, and `-` as the path to read from stdin.

use clap::{Arg, ArgAction, ArgMatches, Command};
use serde::Serialize;
use sqlreflow::sql::{DialectRegistry, Pipeline, PipelineError};
use sqlreflow_config::{Loader, SqlreflowConfig};
use std::io::Read;

fn main() {
    let config_arg = Arg::new("config")
        .long("config")
        .short('c')
        .help("TOML file layered over the built-in defaults")
        .global(true);

    let matches = Command::new("sqlreflow")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Inspect how sqlreflow parses and reindents SQL")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(config_arg)
        .subcommand(
            Command::new("parse")
                .about("Parse a file and print its syntax tree")
                .arg(
                    Arg::new("path")
                        .help("SQL file to parse, or - for stdin")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("format")
                        .long("format")
                        .short('f')
                        .help("Output format")
                        .value_parser(["tree", "json", "yaml"])
                        .default_value("tree"),
                )
                .arg(
                    Arg::new("code-only")
                        .long("code-only")
                        .help("Leave whitespace and meta segments out of the tree dump")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("reindent")
                .about("Reindent a file and print the result")
                .arg(
                    Arg::new("path")
                        .help("SQL file to reindent, or - for stdin")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("check")
                        .long("check")
                        .help("Report problems instead of printing the fixed file")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("format")
                        .long("format")
                        .short('f')
                        .help("Report format for --check")
                        .value_parser(["text", "json", "yaml"])
                        .default_value("text"),
                ),
        )
        .subcommand(Command::new("list-dialects").about("List the bundled dialects"))
        .get_matches();

    let config = load_config(matches.get_one::<String>("config"));

    let code = match matches.subcommand() {
        Some(("parse", parse_matches)) => handle_parse_command(&config, parse_matches),
        Some(("reindent", reindent_matches)) => handle_reindent_command(&config, reindent_matches),
        Some(("list-dialects", _)) => handle_list_dialects_command(),
        _ => unreachable!(),
    };
    std::process::exit(code);
}

fn load_config(path: Option<&String>) -> SqlreflowConfig {
    let mut loader = Loader::new();
    if let Some(path) = path {
        loader = loader.with_file(path);
    }
    loader.build().unwrap_or_else(|e| {
        eprintln!("Error loading configuration: {}", e);
        std::process::exit(2);
    })
}

fn read_source(path: &str) -> String {
    let result = if path == "-" {
        let mut buff = String::new();
        std::io::stdin().read_to_string(&mut buff).map(|_| buff)
    } else {
        std::fs::read_to_string(path)
    };
    result.unwrap_or_else(|e| {
        eprintln!("Error reading file: {}", e);
        std::process::exit(2);
    })
}

fn build_pipeline(config: &SqlreflowConfig) -> Pipeline {
    Pipeline::from_config(config).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(2);
    })
}

fn report_error(err: PipelineError, source: &str) -> i32 {
    match err {
        PipelineError::Parse(parse_err) => eprint!("{}", parse_err.render(source)),
        other => eprintln!("Error: {}", other),
    }
    2
}

fn serialize<T: Serialize>(value: &T, format: &str) -> Result<String, String> {
    match format {
        "json" => serde_json::to_string_pretty(value)
            .map(|mut out| {
                out.push('\n');
                out
            })
            .map_err(|e| e.to_string()),
        "yaml" => serde_yaml::to_string(value).map_err(|e| e.to_string()),
        other => Err(format!("unsupported format '{}'", other)),
    }
}

/// Handle the parse command. Exits 1 when the file has unparsable regions.
fn handle_parse_command(config: &SqlreflowConfig, matches: &ArgMatches) -> i32 {
    let path = matches.get_one::<String>("path").unwrap();
    let format = matches.get_one::<String>("format").unwrap();
    let code_only = matches.get_flag("code-only");
    let source = read_source(path);
    let pipeline = build_pipeline(config);

    let parsed = match pipeline.parse(&source, path) {
        Ok(parsed) => parsed,
        Err(e) => return report_error(e, &source),
    };

    let output = match format.as_str() {
        "tree" => Ok(parsed.tree.stringify(code_only)),
        other => serialize(&parsed.tree.to_record(), other),
    };
    match output {
        Ok(output) => print!("{}", output),
        Err(e) => {
            eprintln!("Serialization error: {}", e);
            return 2;
        }
    }

    for diagnostic in &parsed.diagnostics {
        eprintln!("{}: {}", path, diagnostic);
    }
    i32::from(!parsed.is_clean())
}

#[derive(Serialize)]
struct ResultRecord {
    line_no: Option<usize>,
    line_pos: Option<usize>,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reference_line: Option<usize>,
}

/// Handle the reindent command. With `--check`, exits 1 when anything would change.
fn handle_reindent_command(config: &SqlreflowConfig, matches: &ArgMatches) -> i32 {
    let path = matches.get_one::<String>("path").unwrap();
    let format = matches.get_one::<String>("format").unwrap();
    let check = matches.get_flag("check");
    let source = read_source(path);
    let pipeline = build_pipeline(config);

    let outcome = match pipeline.reindent(&source, path) {
        Ok(outcome) => outcome,
        Err(e) => return report_error(e, &source),
    };
    if !outcome.converged {
        eprintln!(
            "{}: indentation did not settle after {} passes",
            path, outcome.passes
        );
    }

    if !check {
        print!("{}", outcome.fixed);
        return 0;
    }

    let records: Vec<ResultRecord> = outcome
        .results
        .iter()
        .map(|result| {
            let position = result.anchor.as_ref().and_then(|a| a.position());
            ResultRecord {
                line_no: position.map(|p| p.line_no()),
                line_pos: position.map(|p| p.line_pos()),
                description: result.description.clone(),
                reference_line: result.reference_line,
            }
        })
        .collect();

    if format == "text" {
        for record in &records {
            let line = record.line_no.map_or("?".to_string(), |l| l.to_string());
            let pos = record.line_pos.map_or("?".to_string(), |p| p.to_string());
            println!("{}:{}:{}: {}", path, line, pos, record.description);
        }
    } else {
        match serialize(&records, format) {
            Ok(output) => print!("{}", output),
            Err(e) => {
                eprintln!("Serialization error: {}", e);
                return 2;
            }
        }
    }
    i32::from(outcome.is_changed())
}

/// Handle the list-dialects command
fn handle_list_dialects_command() -> i32 {
    match DialectRegistry::with_defaults() {
        Ok(registry) => {
            println!("Available dialects:\n");
            for name in registry.names() {
                println!("  {}", name);
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            2
        }
    }
}
