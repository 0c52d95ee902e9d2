use std::{env, path::PathBuf};

use gcft::pk::write_baselines;

fn main() -> anyhow::Result<()> {
    let mut args = env::args().skip(1);
    let src = PathBuf::from(args.next().unwrap_or_else(|| "gcft00_pk.dat".into()));
    let out_dir = PathBuf::from(args.next().unwrap_or_else(|| "baselines".into()));
    let prefix = args.next().unwrap_or_else(|| "gcft00".into());

    let written = write_baselines(&src, &out_dir, &prefix)?;
    for path in &written {
        println!("[baseline] {}", path.display());
    }
    println!("Baselines written to {}", out_dir.display());
    Ok(())
}
