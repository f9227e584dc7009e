use crate::types::{Action, ParamValue, Router};

/// Version passed to the control-plane program when the router has none
/// stored yet.
pub const DEFAULT_VERSION: &str = "1.5";

/// Map a UI-facing action name to the control-plane subcommand.
/// Unknown names pass through unchanged.
fn resolve_alias(command: &str) -> &str {
    match command {
        "interface-down" => "shut",
        "interface-up" => "no-shut",
        "deny-traffic" => "simple-block",
        "allow-traffic" => "simple-unblock",
        "show-denied" => "get-blocks",
        "clear-denied" => "clear-blocks",
        other => other,
    }
}

/// Map a parameter key to its CLI flag name.
/// Unrecognized keys keep their own name.
fn rename_key(key: &str) -> &str {
    match key {
        "latency" => "ms",
        "corrupt" => "corruption",
        "interface" => "iface",
        other => other,
    }
}

/// Flags each subcommand accepts, by renamed flag name. A parameter whose
/// renamed flag is not in its command's set is dropped, never forwarded.
///
/// This enumeration is the real contract with the control-plane program:
/// `simple-block`/`simple-unblock` take an IP but no interface, the block
/// listing/clearing commands take nothing at all, and everything else takes
/// an interface plus its own knobs.
fn accepted_flags(subcommand: &str) -> &'static [&'static str] {
    match subcommand {
        "get-blocks" | "clear-blocks" => &[],
        "simple-block" | "simple-unblock" => &["ip"],
        "fw-block" => &["iface", "ip", "force"],
        "fw-unblock" => &["iface", "ip"],
        "set-latency" => &["iface", "ms"],
        "set-loss" => &["iface", "loss"],
        "set-corruption" => &["iface", "corruption"],
        "set-reorder" => &["iface", "reorder", "gap"],
        "set-rate" => &["iface", "rate"],
        "set-qos" => &["iface", "ms", "loss", "corruption", "reorder", "reorder-gap", "rate"],
        // shut, no-shut, clear-*, get-fw-blocks, and any unknown subcommand
        // take the interface and nothing else.
        _ => &["iface"],
    }
}

/// Build the full argument vector for one action. Pure; no side effects.
///
/// Layout: `--host H --key K --version V <subcommand> [flags]`. Global flags
/// come first, matching the control-plane program's parser.
pub fn translate(router: &Router, action: &Action) -> Vec<String> {
    let subcommand = resolve_alias(&action.command);
    let version = if router.version.is_empty() {
        DEFAULT_VERSION
    } else {
        router.version.as_str()
    };

    let mut argv = vec![
        "--host".to_string(),
        router.host.clone(),
        "--key".to_string(),
        router.api_key.clone(),
        "--version".to_string(),
        version.to_string(),
        subcommand.to_string(),
    ];

    let accepted = accepted_flags(subcommand);
    for (key, value) in &action.params {
        let flag = rename_key(key);
        // set-qos spells the reorder gap --reorder-gap; only set-reorder
        // takes a bare --gap.
        let flag = if subcommand == "set-qos" && flag == "gap" {
            "reorder-gap"
        } else {
            flag
        };
        if !accepted.contains(&flag) {
            continue;
        }
        match value {
            // Nulls and empty strings are always skipped.
            ParamValue::Null => {}
            ParamValue::Text(text) if text.is_empty() => {}
            // Booleans are bare flags, emitted only when true.
            ParamValue::Bool(true) => argv.push(format!("--{flag}")),
            ParamValue::Bool(false) => {}
            ParamValue::Number(number) => {
                argv.push(format!("--{flag}"));
                argv.push(number.to_string());
            }
            ParamValue::Text(text) => {
                argv.push(format!("--{flag}"));
                argv.push(text.clone());
            }
        }
    }

    argv
}
