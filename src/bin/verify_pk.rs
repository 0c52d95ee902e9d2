use std::{env, path::PathBuf, process::exit};

use gcft::pk::{PK_TOL, VerifyOutcome, gather_blocks, verify};

fn main() {
    let mut args = env::args().skip(1);
    let out_dir = PathBuf::from(args.next().unwrap_or_else(|| "output".into()));
    let prefix = args.next().unwrap_or_else(|| "gcft_zscan".into());
    let baselines_dir = PathBuf::from(args.next().unwrap_or_else(|| "baselines".into()));
    let baseline_combined = PathBuf::from(args.next().unwrap_or_else(|| "gcft00_pk.dat".into()));

    let new_combined = out_dir.join(format!("{prefix}_pk.dat"));
    let new_blocks = match gather_blocks(&out_dir, &prefix, &new_combined) {
        Ok(blocks) => blocks,
        Err(e) => {
            println!("[FAIL] Could not read new outputs: {e}");
            exit(1);
        }
    };
    let base_blocks = match gather_blocks(&baselines_dir, "gcft00", &baseline_combined) {
        Ok(blocks) => blocks,
        Err(e) => {
            println!("[FAIL] Could not read baselines: {e}");
            exit(1);
        }
    };

    match verify(&new_blocks, &base_blocks) {
        VerifyOutcome::NoNewData => {
            println!(
                "[FAIL] No new {prefix} pk outputs found in '{}'.",
                out_dir.display()
            );
            exit(1);
        }
        VerifyOutcome::NoBaseline => {
            println!(
                "[WARN] No baselines found (neither {}/gcft00_pk_z*.dat nor {}). Skipping verification.",
                baselines_dir.display(),
                baseline_combined.display()
            );
            exit(0);
        }
        VerifyOutcome::NoCommonRedshifts { new, base } => {
            println!("[FAIL] No common redshifts. New={new:?} vs Base={base:?}");
            exit(1);
        }
        VerifyOutcome::Compared {
            reports,
            new_only,
            base_only,
        } => {
            let mut ok = true;
            for r in &reports {
                match r.max_rel {
                    None => {
                        println!("[FAIL] z={}: no overlapping k-range.", r.z);
                        ok = false;
                    }
                    Some(diff) => {
                        let tag = if r.passed() { "OK" } else { "FAIL" };
                        println!(
                            "[{tag}] Pk @ z={}: max rel diff = {diff:.3e} (tol={PK_TOL:.1e})",
                            r.z
                        );
                        ok &= r.passed();
                    }
                }
            }
            if !new_only.is_empty() {
                println!("[INFO] New-only z: {new_only:?}");
            }
            if !base_only.is_empty() {
                println!("[INFO] Baseline-only z: {base_only:?}");
            }
            exit(if ok { 0 } else { 1 });
        }
    }
}
