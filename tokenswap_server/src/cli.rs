use std::{env, env::VarError};

/// The server takes no arguments. Any argument prints the help text and the current configuration instead.
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // TSW_LEDGER_API_KEY is deliberately absent
    const DISPLAY_ENVS: [&str; 12] = [
        "RUST_LOG",
        "TSW_DATABASE_URL",
        "TSW_RUN_MIGRATIONS",
        "TSW_PAIRS",
        "TSW_CHAINS",
        "TSW_MINIMUM_AMOUNT",
        "TSW_ORDER_TIMEOUT",
        "TSW_MAX_PENDING_TIMEOUTS",
        "TSW_POLL_INTERVAL",
        "TSW_SWEEP_INTERVAL",
        "TSW_LEDGER_URL",
        "TSW_MONITORED_TOKENS",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
