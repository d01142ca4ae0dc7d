//! CLI surface: command parsing and flag validation.

use abathur::cli::commands::swarm::SwarmCommands;
use abathur::cli::commands::task::{parse_older_than, TaskCommands};
use abathur::cli::{Cli, Commands};
use clap::Parser;

fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
    Cli::try_parse_from(std::iter::once("abathur").chain(args.iter().copied()))
}

#[test]
fn test_task_submit_defaults() {
    let cli = parse(&["task", "submit", "do the thing"]).unwrap();
    let Commands::Task(args) = cli.command else {
        panic!("expected task command");
    };
    let TaskCommands::Submit {
        prompt,
        agent_type,
        priority,
        depends_on,
        ..
    } = args.command
    else {
        panic!("expected submit");
    };
    assert_eq!(prompt, "do the thing");
    assert_eq!(agent_type, "requirements-gatherer");
    assert_eq!(priority, 5);
    assert!(depends_on.is_empty());
}

#[test]
fn test_task_submit_with_options() {
    let cli = parse(&[
        "task",
        "submit",
        "big feature",
        "--priority",
        "8",
        "--agent-type",
        "implementer",
        "--depends-on",
        "abc123",
        "--depends-on",
        "def456",
        "--summary",
        "Feature work",
    ])
    .unwrap();
    let Commands::Task(args) = cli.command else {
        panic!()
    };
    let TaskCommands::Submit {
        priority,
        agent_type,
        depends_on,
        summary,
        ..
    } = args.command
    else {
        panic!()
    };
    assert_eq!(priority, 8);
    assert_eq!(agent_type, "implementer");
    assert_eq!(depends_on, vec!["abc123", "def456"]);
    assert_eq!(summary.as_deref(), Some("Feature work"));
}

#[test]
fn test_submit_input_flags_conflict() {
    let result = parse(&[
        "task",
        "submit",
        "p",
        "--input-file",
        "in.json",
        "--input-json",
        "{}",
    ]);
    assert!(result.is_err());
}

#[test]
fn test_task_list_tree_flags() {
    let cli = parse(&["task", "list", "--tree", "--ascii"]).unwrap();
    let Commands::Task(args) = cli.command else {
        panic!()
    };
    let TaskCommands::List { tree, ascii, .. } = args.command else {
        panic!()
    };
    assert!(tree);
    assert!(ascii);

    // --lineage is an alias for --tree.
    let cli = parse(&["task", "list", "--lineage"]).unwrap();
    let Commands::Task(args) = cli.command else {
        panic!()
    };
    let TaskCommands::List { tree, .. } = args.command else {
        panic!()
    };
    assert!(tree);

    // unicode and ascii are mutually exclusive.
    assert!(parse(&["task", "list", "--unicode", "--ascii"]).is_err());
}

#[test]
fn test_task_prune_flags() {
    let cli = parse(&[
        "task",
        "prune",
        "--older-than",
        "30d",
        "--vacuum",
        "never",
        "--dry-run",
        "--limit",
        "10",
    ])
    .unwrap();
    let Commands::Task(args) = cli.command else {
        panic!()
    };
    let TaskCommands::Prune {
        older_than,
        vacuum,
        dry_run,
        limit,
        recursive,
        preview_depth,
        ..
    } = args.command
    else {
        panic!()
    };
    assert_eq!(older_than.as_deref(), Some("30d"));
    assert_eq!(vacuum, "never");
    assert!(dry_run);
    assert_eq!(limit, Some(10));
    assert!(!recursive);
    assert_eq!(preview_depth, 5);
}

#[test]
fn test_swarm_start_flags() {
    let cli = parse(&[
        "swarm",
        "start",
        "--task-limit",
        "5",
        "--max-agents",
        "4",
        "--poll-interval",
        "1",
    ])
    .unwrap();
    let Commands::Swarm(args) = cli.command else {
        panic!()
    };
    let SwarmCommands::Start {
        task_limit,
        max_agents,
        poll_interval,
    } = args.command
    else {
        panic!()
    };
    assert_eq!(task_limit, Some(5));
    assert_eq!(max_agents, Some(4));
    assert_eq!(poll_interval, Some(1));
}

#[test]
fn test_init_and_status() {
    let cli = parse(&["init", "--validate", "--db-path", "/tmp/q.db"]).unwrap();
    let Commands::Init {
        validate,
        db_path,
        skip_template,
    } = cli.command
    else {
        panic!()
    };
    assert!(validate);
    assert_eq!(db_path.as_deref(), Some("/tmp/q.db"));
    assert!(!skip_template);

    assert!(matches!(parse(&["status"]).unwrap().command, Commands::Status));
}

#[test]
fn test_json_is_global() {
    let cli = parse(&["--json", "task", "list"]).unwrap();
    assert!(cli.json);
    let cli = parse(&["task", "list", "--json"]).unwrap();
    assert!(cli.json);
}

#[test]
fn test_duration_grammar() {
    assert_eq!(parse_older_than("30d").unwrap(), 30);
    assert_eq!(parse_older_than("2w").unwrap(), 14);
    assert_eq!(parse_older_than("6m").unwrap(), 180);
    assert_eq!(parse_older_than("1y").unwrap(), 365);
    assert!(parse_older_than("fortnight").is_err());
}

#[test]
fn test_unknown_subcommand_rejected() {
    assert!(parse(&["task", "obliterate"]).is_err());
    assert!(parse(&["goals"]).is_err());
}
