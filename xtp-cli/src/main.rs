use std::{path::PathBuf, time::Instant};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use xtp_core::{
    atom::Atom,
    basis::{AoBasis, Convention},
    config::{load_basis_set, JobConfig},
    dft::DftEngine,
    embedding::{EwaldEnvironment, QmapeMachine},
    gwbse::GwbseEngine,
    molecule::Molecule,
    orbitals::{Orbitals, Spin},
    units,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: XtpCommand,
}

#[derive(Subcommand, Debug)]
enum XtpCommand {
    /// Ground state of the molecule of a job file
    Dft {
        /// Job file with the molecule, basis sets and options
        #[arg(long, short)]
        job: PathBuf,
        /// Where to write the orbitals checkpoint
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Ground state followed by GW quasiparticles and BSE excitations
    Gwbse {
        #[arg(long, short)]
        job: PathBuf,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Self-consistent embedding of the molecule into the environment of the job
    Qmape {
        #[arg(long, short)]
        job: PathBuf,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Converts the MO coefficients of a checkpoint between function orderings
    Reorder {
        #[arg(long, short)]
        checkpoint: PathBuf,
        /// Basis set the checkpoint was computed with
        #[arg(long, short)]
        basis_set: PathBuf,
        #[arg(long, value_parser = parse_convention)]
        from: Convention,
        #[arg(long, value_parser = parse_convention, default_value = "xtp")]
        to: Convention,
        /// Defaults to overwriting the checkpoint
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

fn parse_convention(name: &str) -> Result<Convention, String> {
    name.parse().map_err(|err: xtp_core::error::XtpError| err.to_string())
}

fn dft_engine(job: &JobConfig) -> anyhow::Result<(DftEngine, Molecule)> {
    let basis_set = load_basis_set(&job.basis_set)
        .with_context(|| format!("loading basis set {}", job.basis_set.display()))?;
    let molecule = Molecule::try_from(job.molecule.clone())?;
    let engine = DftEngine::new(job.dft.clone(), basis_set)?;
    Ok((engine, molecule))
}

fn gwbse_engine(job: &JobConfig) -> anyhow::Result<GwbseEngine> {
    let Some(path) = job.auxiliary_basis_set.as_ref() else {
        bail!("GW-BSE needs an auxiliary_basis_set in the job file");
    };
    let auxiliary = load_basis_set(path)
        .with_context(|| format!("loading auxiliary basis set {}", path.display()))?;
    Ok(GwbseEngine::new(job.gwbse.clone(), auxiliary)?)
}

fn write_orbitals(orbitals: &Orbitals, output: Option<PathBuf>) -> anyhow::Result<()> {
    if let Some(output) = output {
        orbitals
            .write_to_cpt(&output)
            .with_context(|| format!("writing checkpoint {}", output.display()))?;
    }
    Ok(())
}

fn print_excitations(orbitals: &Orbitals) {
    let strengths = orbitals.oscillator_strengths();
    for spin in [Spin::Singlet, Spin::Triplet] {
        for (state, omega) in orbitals.bse_energies(spin).iter().enumerate() {
            match (spin, strengths.get(state)) {
                (Spin::Singlet, Some(f)) => {
                    println!("{spin} {:3}: {:10.6} eV  f = {f:.4}", state + 1, omega * units::HRT2EV)
                }
                _ => println!("{spin} {:3}: {:10.6} eV", state + 1, omega * units::HRT2EV),
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let args: Args = Args::parse();

    match args.command {
        XtpCommand::Dft { job, output } => {
            let job = JobConfig::from_path(&job)
                .with_context(|| format!("reading job {}", job.display()))?;
            let (mut dft, molecule) = dft_engine(&job)?;

            let start = Instant::now();
            dft.prepare(molecule.atoms())?;
            let mut orbitals = Orbitals::new();
            let summary = dft.evaluate(&mut orbitals)?;

            println!(
                "SCF {} after {} iterations and {:0.2?}",
                if summary.converged { "converged" } else { "did not converge" },
                summary.iterations,
                start.elapsed()
            );
            println!("total energy: {:.10} Ha", summary.total_energy);
            println!(
                "HOMO {:.6} eV, LUMO {:.6} eV",
                orbitals.mo_energies[orbitals.occupied_levels - 1] * units::HRT2EV,
                orbitals
                    .mo_energies
                    .get(orbitals.occupied_levels)
                    .map_or(f64::NAN, |lumo| lumo * units::HRT2EV)
            );
            write_orbitals(&orbitals, output)?;
        }

        XtpCommand::Gwbse { job, output } => {
            let job = JobConfig::from_path(&job)
                .with_context(|| format!("reading job {}", job.display()))?;
            let (mut dft, molecule) = dft_engine(&job)?;
            let gwbse = gwbse_engine(&job)?;

            let start = Instant::now();
            dft.prepare(molecule.atoms())?;
            let mut orbitals = Orbitals::new();
            let summary = dft.evaluate(&mut orbitals)?;
            if !summary.converged {
                log::warn!("continuing GW-BSE from an unconverged SCF");
            }
            let gw = gwbse.evaluate(&mut orbitals, dft.basis()?)?;

            println!(
                "GW-BSE finished after {:0.2?}, quasiparticles {}",
                start.elapsed(),
                if gw.qp_converged { "converged" } else { "not converged" }
            );
            print_excitations(&orbitals);
            write_orbitals(&orbitals, output)?;
        }

        XtpCommand::Qmape { job, output } => {
            let job = JobConfig::from_path(&job)
                .with_context(|| format!("reading job {}", job.display()))?;
            let Some(topology) = job.load_environment().context("reading the environment")? else {
                bail!("QMAPE needs an environment in the job file");
            };
            let (dft, _) = dft_engine(&job)?;
            let gwbse = if job.qmape.tasks.run_gwbse {
                Some(gwbse_engine(&job)?)
            } else {
                None
            };
            let environment = EwaldEnvironment::new(job.ewald.clone(), topology)?;
            let mut machine = QmapeMachine::new(job.qmape.clone(), dft, gwbse, environment)?;

            let start = Instant::now();
            let outcome = machine.evaluate()?;
            println!(
                "QMAPE {} after {} iterations and {:0.2?}",
                if outcome.converged { "converged" } else { "did not converge" },
                outcome.iterations.len(),
                start.elapsed()
            );
            println!("QM energy: {:.6} eV", outcome.qm_energy);
            println!("MM energy: {:.6} eV", outcome.mm_energy);
            machine.environment().show_energy_splitting();
            write_orbitals(&outcome.orbitals, output)?;
        }

        XtpCommand::Reorder {
            checkpoint,
            basis_set,
            from,
            to,
            output,
        } => {
            let mut orbitals = Orbitals::read_from_cpt(&checkpoint)
                .with_context(|| format!("reading checkpoint {}", checkpoint.display()))?;
            let basis_set = load_basis_set(&basis_set)?;
            let atoms = orbitals.atoms.iter().map(|atom| atom.to_atom()).collect::<Vec<Atom>>();
            let basis = AoBasis::fill(&basis_set, &atoms, None)?;

            // one row per orbital
            let mut coefficients = orbitals.mo_coefficients.transpose();
            basis
                .reorder_mos(&mut coefficients, from, to)
                .with_context(|| format!("reordering {from} to {to}"))?;
            orbitals.mo_coefficients = coefficients.transpose();

            write_orbitals(&orbitals, Some(output.unwrap_or(checkpoint)))?;
        }
    }

    Ok(())
}
