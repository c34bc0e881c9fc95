//! Parsers for Slurm command output.

use chrono::{Local, NaiveDateTime, TimeZone};
use rustc_hash::FxHashMap;

use crate::error::{AdapterError, AdapterResult};
use crate::exec::{CommandOutput, CommandSpec};
use crate::live::{
    AccessList, LiveJobRow, LiveStatus, NodeInfo, NodeState, PartitionInfo, PartitionTotals,
};
use crate::state::JobState;
use crate::tres;

/// Marker printed by every client command when slurmctld is down.
pub const CONTROLLER_UNREACHABLE: &str = "Unable to contact slurm controller";

/// `squeue --format` used for job listings. The name comes last so that a
/// `|` inside it cannot shift the other columns.
pub const SQUEUE_JOB_FORMAT: &str = "%A|%P|%u|%a|%q|%T|%D|%C|%b|%l|%M|%S|%r|%N|%Z|%j";

/// `squeue --format` used for the batched reason lookup.
pub const SQUEUE_REASON_FORMAT: &str = "%A|%T|%M|%r";

/// Fail on an unreachable controller or a non-zero exit status.
pub fn check_output(spec: &CommandSpec, output: &CommandOutput) -> AdapterResult<()> {
    if output.stdout.contains(CONTROLLER_UNREACHABLE)
        || output.stderr.contains(CONTROLLER_UNREACHABLE)
    {
        return Err(AdapterError::ControllerUnreachable(spec.display()));
    }
    if !output.success() {
        return Err(AdapterError::CommandFailed {
            command: spec.display(),
            message: output.stderr.trim().to_string(),
        });
    }
    Ok(())
}

/// Split a one-line `scontrol -o` record into `Key=Value` pairs.
///
/// Words without `=` belong to the preceding value (`OS=Linux 5.14 #1 SMP`).
pub fn parse_key_values(line: &str) -> FxHashMap<String, String> {
    let mut fields = FxHashMap::default();
    let mut last_key: Option<String> = None;
    for word in line.split_whitespace() {
        match word.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                fields.insert(key.to_string(), value.to_string());
                last_key = Some(key.to_string());
            }
            _ => {
                if let Some(value) = last_key.as_ref().and_then(|k| fields.get_mut(k)) {
                    value.push(' ');
                    value.push_str(word);
                }
            }
        }
    }
    fields
}

fn field_i64(fields: &FxHashMap<String, String>, key: &str) -> i64 {
    fields
        .get(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

/// Parse `scontrol show partition -o` output.
pub fn parse_partitions(output: &str) -> Vec<PartitionInfo> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("PartitionName="))
        .map(|line| {
            let fields = parse_key_values(line);
            let named = fields
                .get("TRES")
                .map(|t| tres::parse_named(t))
                .unwrap_or_default();
            let cores = match field_i64(&fields, "TotalCPUs") {
                0 => named.cpus,
                n => n,
            };
            let nodes = match field_i64(&fields, "TotalNodes") {
                0 => named.nodes,
                n => n,
            };
            PartitionInfo {
                name: fields.get("PartitionName").cloned().unwrap_or_default(),
                allow_accounts: fields
                    .get("AllowAccounts")
                    .map_or(AccessList::All, |v| AccessList::parse(v)),
                totals: PartitionTotals {
                    cores,
                    mem_mb: named.mem_mb,
                    nodes,
                    gpus: named.gpus,
                    qos: fields
                        .get("AllowQos")
                        .map_or(AccessList::All, |v| AccessList::parse(v)),
                },
                state: fields.get("State").cloned().unwrap_or_default(),
            }
        })
        .collect()
}

/// Parse `scontrol show node -o` output.
pub fn parse_nodes(output: &str) -> Vec<NodeInfo> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("NodeName="))
        .map(|line| {
            let fields = parse_key_values(line);
            let cfg = fields
                .get("CfgTRES")
                .map(|t| tres::parse_named(t))
                .unwrap_or_default();
            let alloc = fields
                .get("AllocTRES")
                .map(|t| tres::parse_named(t))
                .unwrap_or_default();
            let raw_state = fields.get("State").cloned().unwrap_or_default();
            NodeInfo {
                name: fields.get("NodeName").cloned().unwrap_or_default(),
                partitions: fields
                    .get("Partitions")
                    .map(|p| {
                        p.split(',')
                            .filter(|s| !s.is_empty())
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
                state: NodeState::classify(&raw_state),
                raw_state,
                cpus_total: field_i64(&fields, "CPUTot"),
                cpus_alloc: field_i64(&fields, "CPUAlloc"),
                mem_total_mb: field_i64(&fields, "RealMemory"),
                mem_alloc_mb: field_i64(&fields, "AllocMem"),
                gpus_total: cfg.gpus,
                gpus_alloc: alloc.gpus,
            }
        })
        .collect()
}

/// Extract `SelectType` from `scontrol show config`.
pub fn parse_select_type(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let (key, value) = line.split_once('=')?;
        (key.trim() == "SelectType").then(|| value.trim().to_string())
    })
}

/// Parse a job-listing `squeue` output produced with [`SQUEUE_JOB_FORMAT`].
///
/// Lines that do not have every column, or carry a non-numeric id, are skipped.
pub fn parse_squeue_jobs(output: &str) -> Vec<LiveJobRow> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let cols: Vec<&str> = line.splitn(16, '|').collect();
            if cols.len() < 16 {
                return None;
            }
            let job_id = cols[0].trim().parse().ok()?;
            let state = JobState::from_label(cols[5])?;
            let node_count: i64 = cols[6].trim().parse().unwrap_or(0);
            let gres = none_if_na(cols[8]);
            Some(LiveJobRow {
                job_id,
                partition: cols[1].trim().to_string(),
                user: cols[2].trim().to_string(),
                account: cols[3].trim().to_string(),
                qos: cols[4].trim().to_string(),
                state,
                node_count,
                cpu_count: cols[7].trim().parse().unwrap_or(0),
                gpu_count: parse_gres_gpus(&gres) * node_count.max(1),
                gres,
                time_limit_minutes: parse_time_limit_minutes(cols[9]),
                elapsed_seconds: parse_elapsed_seconds(cols[10]).unwrap_or(0),
                start_time: parse_timestamp(cols[11]),
                reason: none_if_na(cols[12]),
                node_list: none_if_na(cols[13]),
                work_dir: none_if_na(cols[14]),
                name: cols[15].trim_end_matches(['\r', '\n']).to_string(),
            })
        })
        .collect()
}

/// Parse the batched reason lookup produced with [`SQUEUE_REASON_FORMAT`].
pub fn parse_squeue_reasons(output: &str) -> FxHashMap<i64, LiveStatus> {
    output
        .lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.splitn(4, '|').collect();
            if cols.len() < 4 {
                return None;
            }
            let job_id = cols[0].trim().parse().ok()?;
            Some((
                job_id,
                LiveStatus {
                    state: JobState::from_label(cols[1]),
                    elapsed_seconds: parse_elapsed_seconds(cols[2]).unwrap_or(0),
                    reason: none_if_na(cols[3]),
                },
            ))
        })
        .collect()
}

fn none_if_na(value: &str) -> String {
    let value = value.trim();
    if value == "N/A" || value == "(null)" || value == "None" {
        String::new()
    } else {
        value.to_string()
    }
}

/// Gpus per node from a gres/tres-per-node column
/// (`gres/gpu:2`, `gres:gpu:a100:2`, `gpu:1`, `gres/gpu=4`).
pub fn parse_gres_gpus(gres: &str) -> i64 {
    gres.split(',')
        .filter_map(|entry| {
            let entry = entry.trim();
            let entry = entry
                .strip_prefix("gres/")
                .or_else(|| entry.strip_prefix("gres:"))
                .unwrap_or(entry);
            let rest = entry.strip_prefix("gpu")?;
            if rest.is_empty() {
                return Some(1);
            }
            // Drop a trailing "(IDX:0-1)" style annotation.
            let rest = rest.split('(').next().unwrap_or(rest);
            let count = rest.rsplit([':', '=']).next()?;
            Some(count.parse().unwrap_or(1))
        })
        .sum()
}

/// Parse a time limit (`UNLIMITED`, `30:00`, `2:00:00`, `1-00:00:00`) into minutes.
pub fn parse_time_limit_minutes(value: &str) -> Option<i64> {
    parse_elapsed_seconds(value).map(|secs| secs / 60)
}

/// Parse a Slurm duration (`MM:SS`, `HH:MM:SS`, `D-HH:MM:SS`, `D-HH`) into seconds.
pub fn parse_elapsed_seconds(value: &str) -> Option<i64> {
    let value = value.trim();
    if value.is_empty()
        || value.eq_ignore_ascii_case("UNLIMITED")
        || value.eq_ignore_ascii_case("INVALID")
        || value == "N/A"
    {
        return None;
    }
    let (days, clock) = match value.split_once('-') {
        Some((d, rest)) => (d.parse::<i64>().ok()?, rest),
        None => (0, value),
    };
    let parts: Vec<i64> = clock
        .split(':')
        .map(|p| p.parse::<i64>())
        .collect::<Result<_, _>>()
        .ok()?;
    let seconds = match (value.contains('-'), parts.as_slice()) {
        (true, [h]) => h * 3600,
        (true, [h, m]) => h * 3600 + m * 60,
        (_, [h, m, s]) => h * 3600 + m * 60 + s,
        (false, [m, s]) => m * 60 + s,
        (false, [m]) => m * 60,
        _ => return None,
    };
    Some(days * 86400 + seconds)
}

/// Parse an `squeue` timestamp (`2024-05-01T08:30:00`, local time) into
/// Unix seconds; `N/A` and unparseable values give 0.
pub fn parse_timestamp(value: &str) -> i64 {
    NaiveDateTime::parse_from_str(value.trim(), "%Y-%m-%dT%H:%M:%S")
        .ok()
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map_or(0, |dt| dt.timestamp())
}

/// Parse `sbatch` output to extract the job id.
///
/// Accepts both `Submitted batch job 12345` and the `--parsable`
/// form `12345` or `12345;cluster`.
pub fn parse_sbatch_output(output: &str) -> AdapterResult<i64> {
    let trimmed = output.trim();
    let candidate = trimmed
        .lines()
        .find_map(|line| line.trim().strip_prefix("Submitted batch job "))
        .unwrap_or(trimmed);
    let id = candidate.split(';').next().unwrap_or(candidate).trim();
    id.parse().map_err(|_| AdapterError::Parse {
        command: "sbatch".to_string(),
        message: format!("Unexpected output format: {trimmed}"),
    })
}

/// Parse `scontrol show job -o` output to extract the time limit in minutes.
pub fn parse_job_time_limit(output: &str) -> Option<i64> {
    let line = output.lines().find(|l| l.trim().starts_with("JobId="))?;
    parse_key_values(line)
        .get("TimeLimit")
        .and_then(|v| parse_time_limit_minutes(v))
}
