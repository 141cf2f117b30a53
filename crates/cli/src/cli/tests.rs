use std::path::PathBuf;

use clap::Parser;

use super::*;

#[test]
fn parse_export_command() {
	let args = vec!["taskex", "export", "--start", "2025-06-01", "--end", "20250630", "-o", "/tmp/out"];
	let cli = Cli::try_parse_from(args).unwrap();

	match cli.command {
		Commands::Export(args) => {
			assert_eq!(args.start.as_deref(), Some("2025-06-01"));
			assert_eq!(args.end.as_deref(), Some("20250630"));
			assert_eq!(args.output_dir, Some(PathBuf::from("/tmp/out")));
			assert!(!args.headed);
		}
		_ => panic!("Expected Export command"),
	}
}

#[test]
fn export_dates_are_optional() {
	let cli = Cli::try_parse_from(["taskex", "export"]).unwrap();
	match cli.command {
		Commands::Export(args) => {
			assert_eq!(args.start, None);
			assert_eq!(args.end, None);
		}
		_ => panic!("Expected Export command"),
	}
}

#[test]
fn global_flags_after_subcommand() {
	let cli = Cli::try_parse_from(["taskex", "session", "status", "-vv", "-f", "json", "--config", "cfg.json"]).unwrap();
	assert_eq!(cli.verbose, 2);
	assert_eq!(cli.format, OutputFormat::Json);
	assert_eq!(cli.config, Some(PathBuf::from("cfg.json")));
	match cli.command {
		Commands::Session(args) => assert_eq!(args.action, SessionAction::Status),
		_ => panic!("Expected Session command"),
	}
}

#[test]
fn login_timeout_defaults() {
	let cli = Cli::try_parse_from(["taskex", "login"]).unwrap();
	match cli.command {
		Commands::Login(args) => assert_eq!(args.timeout_secs, 300),
		_ => panic!("Expected Login command"),
	}

	let cli = Cli::try_parse_from(["taskex", "login", "--timeout", "30"]).unwrap();
	match cli.command {
		Commands::Login(args) => assert_eq!(args.timeout_secs, 30),
		_ => panic!("Expected Login command"),
	}
}

#[test]
fn parse_requires_file() {
	assert!(Cli::try_parse_from(["taskex", "parse"]).is_err());

	let cli = Cli::try_parse_from(["taskex", "parse", "export.csv", "--strict"]).unwrap();
	match cli.command {
		Commands::Parse(args) => {
			assert_eq!(args.file, PathBuf::from("export.csv"));
			assert!(args.strict);
		}
		_ => panic!("Expected Parse command"),
	}
}
