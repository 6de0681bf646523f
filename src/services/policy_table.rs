//! Parser for the fixed-column table printed by
//! `Get-NetQosPolicy | Format-Table Name, AppPathNameMatchCondition`.
//!
//! ```text
//!
//! Name          AppPathNameMatchCondition
//! ----          -------------------------
//! cs2           D:\SteamLibrary\steamapps\common\Counter-Strike Global Offensive\game\bin\win64\cs2.exe
//! RocketLeague  C:\Program Files\Epic Games\rocketleague\Binaries\Win64\RocketLeague.exe
//!
//! ```
//!
//! Rules: leading blank padding is dropped, then [`HEADER_LINES`] lines (column
//! titles and dashes) are skipped. Each remaining non-blank row splits once, on
//! its first run of whitespace, into name and path. Names containing spaces are
//! therefore truncated at the first space, exactly as the table is ambiguous there.

use crate::models::PolicyRecord;

/// Title row plus dashed separator row.
pub const HEADER_LINES: usize = 2;

/// Rows of a policy table, in the order the store printed them.
pub fn parse_policy_table(output: &str) -> Vec<PolicyRecord> {
    output
        .lines()
        .skip_while(|line| line.trim().is_empty())
        .skip(HEADER_LINES)
        .filter_map(parse_row)
        .collect()
}

fn parse_row(line: &str) -> Option<PolicyRecord> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (name, rest) = line.split_once(char::is_whitespace)?;
    let app_path = rest.trim_start();
    if app_path.is_empty() {
        tracing::debug!("Ignoring policy row without a path: {:?}", line);
        return None;
    }

    Some(PolicyRecord {
        name: name.to_string(),
        app_path: app_path.to_string(),
    })
}
