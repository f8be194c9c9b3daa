use std::path::{Path, PathBuf};

use clap::Parser;

use detqmc::{read_config, DetQmc};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(short, long, default_value = "config.yml")]
    config: String,

    /// Auxiliary-field configuration file to resume from
    #[arg(long)]
    fields: Option<String>,

    /// Suppress sweep progress output
    #[arg(long)]
    quiet: bool,
}

fn main() -> std::io::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = read_config(Path::new(&args.config))?;
    let mut qmc = DetQmc::new(
        config.model,
        config.monte_carlo,
        config.controls,
        config.momentum.qx,
        config.momentum.qy,
    );
    if let Some(fields) = &args.fields {
        qmc.read_aux_field(Path::new(fields))?;
    }

    qmc.print_params();
    qmc.run_qmc(!args.quiet);
    qmc.analyse_stats();
    qmc.print_stats();

    let out_dir = PathBuf::from(config.output.dir.clone().unwrap_or_else(|| ".".into()));
    std::fs::create_dir_all(&out_dir)?;
    qmc.write_tau_axis(&out_dir.join("tau.dat"))?;
    qmc.write_eqtime_stats(&out_dir.join("eqtime.stats.dat"))?;
    qmc.write_dynamic_stats(&out_dir.join("dynamic.stats.dat"))?;
    qmc.write_bin_corr(&out_dir.join("corr.bins.dat"))?;
    qmc.write_bin_ldos(&out_dir.join("ldos.bins.dat"))?;
    qmc.write_aux_field(&out_dir.join("fields.dat"))?;

    Ok(())
}
