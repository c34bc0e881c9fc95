//! Trackable-resource (TRES) strings.
//!
//! Slurm records resource requests and allocations as `id=value` pairs joined
//! by commas, e.g. `1=4,2=8192,4=2`. Ids are assigned per database by the
//! `tres_table`, so they are resolved through a [`TresRegistry`] fetched at
//! query time.

/// Value of `wanted_id` in a TRES string, or 0 when absent or unparseable.
pub fn decode(tres: &str, wanted_id: i64) -> i64 {
    pairs(tres)
        .find(|(id, _)| *id == wanted_id)
        .map_or(0, |(_, value)| value)
}

/// Value of the first id of `ids` present in a TRES string, or 0.
///
/// Precedence follows the order of `ids`, not the order of the pairs.
pub fn decode_any_of(tres: &str, ids: &[i64]) -> i64 {
    ids.iter()
        .find_map(|wanted| pairs(tres).find(|(id, _)| id == wanted))
        .map_or(0, |(_, value)| value)
}

/// Well-formed `(id, value)` pairs; malformed pairs are skipped.
fn pairs(tres: &str) -> impl Iterator<Item = (i64, i64)> + '_ {
    tres.trim().split(',').filter_map(|pair| {
        let (id, value) = pair.split_once('=')?;
        let id = id.trim().parse::<i64>().ok()?;
        let value = value.trim().parse::<i64>().ok()?;
        Some((id, value))
    })
}

/// Row of the `tres_table`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TresRow {
    pub id: i64,
    pub kind: String,
    pub name: String,
}

/// Resource-type ids of one cluster database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TresRegistry {
    pub cpu: Option<i64>,
    pub mem: Option<i64>,
    pub node: Option<i64>,
    /// Every `gres` row naming a gpu (`gpu`, `gpu:a100`, ...).
    pub gpu: Vec<i64>,
}

impl TresRegistry {
    /// Build the registry from `tres_table` rows.
    pub fn from_rows(rows: &[TresRow]) -> Self {
        let mut registry = Self::default();
        for row in rows {
            match (row.kind.as_str(), row.name.as_str()) {
                ("cpu", _) => registry.cpu = Some(row.id),
                ("mem", _) => registry.mem = Some(row.id),
                ("node", _) => registry.node = Some(row.id),
                ("gres", name) if name == "gpu" || name.starts_with("gpu:") => {
                    registry.gpu.push(row.id);
                }
                _ => {}
            }
        }
        registry
    }

    pub fn cpus(&self, tres: &str) -> i64 {
        self.cpu.map_or(0, |id| decode(tres, id))
    }

    pub fn mem_mb(&self, tres: &str) -> i64 {
        self.mem.map_or(0, |id| decode(tres, id))
    }

    pub fn nodes(&self, tres: &str) -> i64 {
        self.node.map_or(0, |id| decode(tres, id))
    }

    pub fn gpus(&self, tres: &str) -> i64 {
        decode_any_of(tres, &self.gpu)
    }
}

/// Parse a named TRES string as printed by `scontrol`
/// (`cpu=64,mem=256000M,node=2,billing=64,gres/gpu=8`) into resource totals.
///
/// Memory is normalised to megabytes.
pub fn parse_named(tres: &str) -> NamedTres {
    let mut out = NamedTres::default();
    let mut untyped_gpus: Option<i64> = None;
    let mut typed_gpus: i64 = 0;
    for pair in tres.trim().split(',') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "cpu" => out.cpus = value.parse().unwrap_or(0),
            "mem" => out.mem_mb = parse_mem_mb(value).unwrap_or(0),
            "node" => out.nodes = value.parse().unwrap_or(0),
            "gres/gpu" => untyped_gpus = value.parse().ok(),
            key if key.starts_with("gres/gpu:") => typed_gpus += value.parse().unwrap_or(0),
            _ => {}
        }
    }
    // Typed entries repeat the untyped total when both are present.
    out.gpus = untyped_gpus.unwrap_or(typed_gpus);
    out
}

/// Totals decoded from a named TRES string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NamedTres {
    pub cpus: i64,
    pub mem_mb: i64,
    pub nodes: i64,
    pub gpus: i64,
}

/// Parse a Slurm memory quantity (`4000`, `4000M`, `250G`, `1T`) into megabytes.
pub fn parse_mem_mb(value: &str) -> Option<i64> {
    let value = value.trim();
    let (digits, unit) = match value.char_indices().find(|(_, c)| c.is_ascii_alphabetic()) {
        Some((idx, _)) => value.split_at(idx),
        None => (value, "M"),
    };
    let number: f64 = digits.parse().ok()?;
    let factor = match unit.to_ascii_uppercase().as_str() {
        "K" => 1.0 / 1024.0,
        "M" => 1.0,
        "G" => 1024.0,
        "T" => 1024.0 * 1024.0,
        _ => return None,
    };
    Some((number * factor).round() as i64)
}
