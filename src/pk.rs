use std::{
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use regex::Regex;

use crate::util::interp_clamped;

/// Relative tolerance for baseline regression comparison.
pub const PK_TOL: f64 = 5e-6;

fn num_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?$").unwrap())
}

fn z_file_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"_z(\d{4})\.dat$").unwrap())
}

/// One P(k) block at a fixed redshift.
#[derive(Debug, Clone, PartialEq)]
pub struct PkBlock {
    pub z: f64,
    pub k: Vec<f64>,
    pub pk: Vec<f64>,
}

fn is_data_line(cols: &[&str]) -> bool {
    cols.len() >= 2 && num_re().is_match(cols[0]) && num_re().is_match(cols[1])
}

/// Lenient two-column parser: keeps lines whose first two whitespace-separated
/// tokens are numeric and silently skips everything else. Malformed lines are
/// never an error.
pub fn parse_table(text: &str) -> Vec<(f64, f64)> {
    let mut rows = Vec::new();
    for line in text.lines() {
        let s = line.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let cols: Vec<&str> = s.split_whitespace().collect();
        if is_data_line(&cols) {
            rows.push((cols[0].parse().unwrap(), cols[1].parse().unwrap()));
        }
    }
    rows
}

fn is_z_header(s: &str) -> bool {
    s.starts_with('#') && s.contains("z =")
}

fn parse_z_header(s: &str) -> Option<f64> {
    s.split_once("z =")?
        .1
        .split_whitespace()
        .next()?
        .replace(',', "")
        .parse()
        .ok()
}

/// Parse a combined P(k) table: blocks delimited by `# z = <float>` comment
/// lines, two numeric columns per data line.
pub fn parse_combined(text: &str) -> Vec<PkBlock> {
    let mut blocks = Vec::new();
    let mut z: Option<f64> = None;
    let mut k = Vec::new();
    let mut pk = Vec::new();
    for line in text.lines() {
        let s = line.trim();
        if s.is_empty() {
            continue;
        }
        if is_z_header(s) {
            if let Some(z_cur) = z.take() {
                if !k.is_empty() {
                    blocks.push(PkBlock {
                        z: z_cur,
                        k: std::mem::take(&mut k),
                        pk: std::mem::take(&mut pk),
                    });
                }
            }
            k.clear();
            pk.clear();
            // unparsable header starts an unkeyed block, discarded below
            z = parse_z_header(s);
            continue;
        }
        if s.starts_with('#') {
            continue;
        }
        if z.is_none() {
            continue;
        }
        let cols: Vec<&str> = s.split_whitespace().collect();
        if is_data_line(&cols) {
            k.push(cols[0].parse().unwrap());
            pk.push(cols[1].parse().unwrap());
        }
    }
    if let Some(z_cur) = z {
        if !k.is_empty() {
            blocks.push(PkBlock { z: z_cur, k, pk });
        }
    }
    blocks
}

/// Same block structure, but every numeric column is kept (used by the
/// baseline splitter, which must preserve extra columns).
pub fn parse_combined_rows(text: &str) -> Vec<(f64, Vec<Vec<f64>>)> {
    let mut blocks = Vec::new();
    let mut z: Option<f64> = None;
    let mut rows: Vec<Vec<f64>> = Vec::new();
    for line in text.lines() {
        let s = line.trim();
        if s.is_empty() {
            continue;
        }
        if is_z_header(s) {
            if let Some(z_cur) = z.take() {
                if !rows.is_empty() {
                    blocks.push((z_cur, std::mem::take(&mut rows)));
                }
            }
            rows.clear();
            z = parse_z_header(s);
            continue;
        }
        if s.starts_with('#') || z.is_none() {
            continue;
        }
        let cols: Vec<&str> = s.split_whitespace().collect();
        if is_data_line(&cols) {
            let parsed: Option<Vec<f64>> = cols.iter().map(|c| c.parse().ok()).collect();
            if let Some(row) = parsed {
                rows.push(row);
            }
        }
    }
    if let Some(z_cur) = z {
        if !rows.is_empty() {
            blocks.push((z_cur, rows));
        }
    }
    blocks
}

/// Recover z from a per-redshift file name like `gcft00_pk_z0025.dat`.
pub fn z_from_filename(name: &str) -> Option<f64> {
    let caps = z_file_re().captures(name)?;
    caps.get(1)?.as_str().parse::<u32>().ok().map(f64::from)
}

/// Per-redshift baseline file name; fractional z truncates to an integer
/// code (lossy).
pub fn baseline_filename(prefix: &str, z: f64) -> String {
    format!("{}_pk_z{:04}.dat", prefix, z as i64)
}

fn read_lossy(path: &Path) -> anyhow::Result<String> {
    Ok(String::from_utf8_lossy(&fs::read(path)?).into_owned())
}

/// Split a combined table into per-redshift baseline files, all columns,
/// `%.8e` formatting. Returns the written paths.
pub fn write_baselines(src: &Path, out_dir: &Path, prefix: &str) -> anyhow::Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)?;
    let mut written = Vec::new();
    for (z, rows) in parse_combined_rows(&read_lossy(src)?) {
        let body: String = rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|v| format!("{v:.8e}"))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n")
            + "\n";
        let path = out_dir.join(baseline_filename(prefix, z));
        fs::write(&path, body)?;
        written.push(path);
    }
    Ok(written)
}

/// Collect P(k) blocks for one dataset: per-redshift files named
/// `<prefix>_pk_z????.dat` under `per_z_dir` are preferred; if none exist,
/// fall back to the combined file at `combined`. Empty if neither exists.
pub fn gather_blocks(
    per_z_dir: &Path,
    prefix: &str,
    combined: &Path,
) -> anyhow::Result<Vec<PkBlock>> {
    let mut per_z: Vec<PathBuf> = Vec::new();
    if per_z_dir.is_dir() {
        for entry in fs::read_dir(per_z_dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with(&format!("{prefix}_pk_z")) && z_file_re().is_match(name) {
                per_z.push(path);
            }
        }
    }
    per_z.sort();
    if !per_z.is_empty() {
        let mut blocks = Vec::new();
        for path in per_z {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            let Some(z) = z_from_filename(name) else {
                continue;
            };
            let rows = parse_table(&read_lossy(&path)?);
            if rows.is_empty() {
                continue;
            }
            let (k, pk) = rows.into_iter().unzip();
            blocks.push(PkBlock { z, k, pk });
        }
        return Ok(blocks);
    }
    if combined.exists() {
        return Ok(parse_combined(&read_lossy(combined)?));
    }
    Ok(Vec::new())
}

/// Sort by k and drop repeated k values, keeping the first occurrence.
fn dedup_first(k: &[f64], pk: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut order: Vec<usize> = (0..k.len()).collect();
    order.sort_by(|&i, &j| k[i].total_cmp(&k[j]));
    let mut ku = Vec::with_capacity(k.len());
    let mut pu = Vec::with_capacity(k.len());
    for i in order {
        if ku.last().is_some_and(|&last| last == k[i]) {
            continue;
        }
        ku.push(k[i]);
        pu.push(pk[i]);
    }
    (ku, pu)
}

/// max |a - b| / max(|b|, 1e-12), NaN entries skipped.
pub fn max_rel_diff(a: &[f64], b: &[f64]) -> f64 {
    let mut worst = f64::NAN;
    for (x, y) in a.iter().zip(b) {
        let d = (x - y).abs() / y.abs().max(1e-12);
        if d.is_nan() {
            continue;
        }
        if worst.is_nan() || d > worst {
            worst = d;
        }
    }
    worst
}

#[derive(Debug, Clone)]
pub struct ZReport {
    pub z: f64,
    /// None: no overlapping k-range at this redshift.
    pub max_rel: Option<f64>,
}

impl ZReport {
    pub fn passed(&self) -> bool {
        matches!(self.max_rel, Some(d) if d <= PK_TOL)
    }
}

#[derive(Debug)]
pub enum VerifyOutcome {
    NoNewData,
    NoBaseline,
    NoCommonRedshifts { new: Vec<f64>, base: Vec<f64> },
    Compared {
        reports: Vec<ZReport>,
        new_only: Vec<f64>,
        base_only: Vec<f64>,
    },
}

impl VerifyOutcome {
    /// Overall verification status. Missing baselines are "nothing to
    /// verify" and count as success; a missing overlap does not.
    pub fn ok(&self) -> bool {
        match self {
            VerifyOutcome::NoBaseline => true,
            VerifyOutcome::Compared { reports, .. } => reports.iter().all(ZReport::passed),
            _ => false,
        }
    }
}

fn sorted_z(blocks: &[PkBlock]) -> Vec<f64> {
    let mut zs: Vec<f64> = blocks.iter().map(|b| b.z).collect();
    zs.sort_by(f64::total_cmp);
    zs
}

fn block_for(blocks: &[PkBlock], z: f64) -> Option<&PkBlock> {
    blocks.iter().find(|b| b.z == z)
}

fn min_max(v: &[f64]) -> (f64, f64) {
    v.iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
            (lo.min(x), hi.max(x))
        })
}

/// Compare new P(k) blocks against baselines: for each common redshift,
/// restrict to the overlapping k-range on the baseline grid, interpolate the
/// (deduplicated) new data onto it, and check the maximum relative
/// difference against [`PK_TOL`].
pub fn verify(new: &[PkBlock], base: &[PkBlock]) -> VerifyOutcome {
    if new.is_empty() {
        return VerifyOutcome::NoNewData;
    }
    if base.is_empty() {
        return VerifyOutcome::NoBaseline;
    }
    let z_new = sorted_z(new);
    let z_base = sorted_z(base);
    let common: Vec<f64> = z_new
        .iter()
        .copied()
        .filter(|z| z_base.contains(z))
        .collect();
    if common.is_empty() {
        return VerifyOutcome::NoCommonRedshifts {
            new: z_new,
            base: z_base,
        };
    }

    let mut reports = Vec::with_capacity(common.len());
    for &z in &common {
        let bn = block_for(new, z).unwrap();
        let bb = block_for(base, z).unwrap();
        let (n_lo, n_hi) = min_max(&bn.k);
        let (b_lo, b_hi) = min_max(&bb.k);
        let (k_min, k_max) = (n_lo.max(b_lo), n_hi.min(b_hi));

        let mut base_k = Vec::new();
        let mut base_pk = Vec::new();
        for (kb, pb) in bb.k.iter().zip(&bb.pk) {
            if *kb >= k_min && *kb <= k_max {
                base_k.push(*kb);
                base_pk.push(*pb);
            }
        }
        if base_k.is_empty() {
            reports.push(ZReport { z, max_rel: None });
            continue;
        }

        let (ku, pu) = dedup_first(&bn.k, &bn.pk);
        let new_interp: Vec<f64> = base_k.iter().map(|&kb| interp_clamped(&ku, &pu, kb)).collect();
        reports.push(ZReport {
            z,
            max_rel: Some(max_rel_diff(&new_interp, &base_pk)),
        });
    }

    VerifyOutcome::Compared {
        reports,
        new_only: z_new.iter().copied().filter(|z| !z_base.contains(z)).collect(),
        base_only: z_base.iter().copied().filter(|z| !z_new.contains(z)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        PkBlock, VerifyOutcome, baseline_filename, max_rel_diff, parse_combined,
        parse_combined_rows, parse_table, verify, z_from_filename,
    };

    const COMBINED: &str = "\
# gcft z-scan output
# z = 0.0
0.01 1000.0
0.02 1200.0
garbage line here
0.04 900.0

# z = 25.0
0.01 500.0
not-a-number 3.0
0.02 450.0
";

    fn logspace_block(z: f64, scale: f64) -> PkBlock {
        let k: Vec<f64> = (0..20).map(|i| 0.01 * 1.3_f64.powi(i)).collect();
        let pk: Vec<f64> = k.iter().map(|ki| scale * 1e3 * ki.powf(-1.5)).collect();
        PkBlock { z, k, pk }
    }

    #[test]
    fn combined_parser_splits_blocks_and_skips_junk() {
        let blocks = parse_combined(COMBINED);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].z, 0.0);
        assert_eq!(blocks[0].k, vec![0.01, 0.02, 0.04]);
        assert_eq!(blocks[1].z, 25.0);
        assert_eq!(blocks[1].pk, vec![500.0, 450.0]);
    }

    #[test]
    fn row_parser_keeps_all_columns() {
        let blocks = parse_combined_rows("# z = 1.0\n1.0 2.0 3.0 4.0\n");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].1[0], vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn lenient_parser_skips_malformed_lines() {
        let rows = parse_table("0.1 2.0\n# comment\nbad row\n0.2 3.0 extra-is-fine\n1e-3\n");
        assert_eq!(rows, vec![(0.1, 2.0), (0.2, 3.0)]);
    }

    #[test]
    fn filename_z_roundtrip() {
        assert_eq!(baseline_filename("gcft00", 25.0), "gcft00_pk_z0025.dat");
        assert_eq!(z_from_filename("gcft00_pk_z0025.dat"), Some(25.0));
        assert_eq!(z_from_filename("gcft00_pk.dat"), None);
        // fractional z truncates to the integer code
        assert_eq!(baseline_filename("gcft00", 2.7), "gcft00_pk_z0002.dat");
    }

    #[test]
    fn verify_passes_within_tolerance() {
        let base = vec![logspace_block(0.0, 1.0), logspace_block(25.0, 1.0)];
        let new = vec![
            logspace_block(0.0, 1.0 + 1e-6),
            logspace_block(25.0, 1.0 + 1e-6),
        ];
        let outcome = verify(&new, &base);
        assert!(outcome.ok(), "{outcome:?}");
        if let VerifyOutcome::Compared { reports, .. } = outcome {
            for r in reports {
                let d = r.max_rel.unwrap();
                assert!((d - 1e-6).abs() < 1e-8, "max rel = {d}");
            }
        }
    }

    #[test]
    fn verify_fails_beyond_tolerance() {
        let base = vec![logspace_block(0.0, 1.0)];
        let new = vec![logspace_block(0.0, 1.0 + 1e-4)];
        assert!(!verify(&new, &base).ok());
    }

    #[test]
    fn verify_handles_missing_data_cases() {
        let some = vec![logspace_block(0.0, 1.0)];
        assert!(matches!(verify(&[], &some), VerifyOutcome::NoNewData));
        // missing baseline: nothing to verify, counts as success
        let no_base = verify(&some, &[]);
        assert!(matches!(no_base, VerifyOutcome::NoBaseline));
        assert!(no_base.ok());
        let other_z = vec![logspace_block(50.0, 1.0)];
        let outcome = verify(&some, &other_z);
        assert!(matches!(outcome, VerifyOutcome::NoCommonRedshifts { .. }));
        assert!(!outcome.ok());
    }

    #[test]
    fn verify_fails_on_disjoint_k_ranges() {
        let base = vec![PkBlock {
            z: 0.0,
            k: vec![1.0, 2.0, 3.0],
            pk: vec![1.0, 1.0, 1.0],
        }];
        let new = vec![PkBlock {
            z: 0.0,
            k: vec![10.0, 20.0],
            pk: vec![1.0, 1.0],
        }];
        let outcome = verify(&new, &base);
        assert!(!outcome.ok());
        if let VerifyOutcome::Compared { reports, .. } = outcome {
            assert!(reports[0].max_rel.is_none());
        }
    }

    #[test]
    fn repeated_k_keeps_first_occurrence() {
        let base = vec![PkBlock {
            z: 0.0,
            k: vec![1.0, 2.0, 3.0],
            pk: vec![10.0, 20.0, 30.0],
        }];
        // duplicate k = 2.0 with a bogus second value: first one wins
        let new = vec![PkBlock {
            z: 0.0,
            k: vec![1.0, 2.0, 2.0, 3.0],
            pk: vec![10.0, 20.0, 999.0, 30.0],
        }];
        let outcome = verify(&new, &base);
        assert!(outcome.ok(), "{outcome:?}");
    }

    #[test]
    fn max_rel_uses_regularized_denominator() {
        let d = max_rel_diff(&[1e-12], &[0.0]);
        assert!(d.is_finite());
        assert!((d - 1.0).abs() < 1e-9);
    }
}
