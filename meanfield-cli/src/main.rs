use std::{fs::File, path::PathBuf, time::Instant};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use meanfield::{
    guess::guess_core_hamiltonian, EffectiveHamiltonian, ExchangeTerm, HamiltonianBuilder,
    OccupationModel, OdaScfSolver, Orbitals, PlainScfSolver, ScfConvergence, SpinModel,
    SystemData, Term,
};
use nalgebra::DMatrix;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: MfCommand,
}

#[derive(Subcommand, Debug)]
enum MfCommand {
    /// Restricted (closed-shell) mean-field calculation
    #[command(name = "rhf")]
    Restricted {
        #[command(flatten)]
        options: ScfOptions,
    },
    /// Unrestricted (spin-polarized) mean-field calculation
    #[command(name = "uhf")]
    Unrestricted {
        #[command(flatten)]
        options: ScfOptions,
    },
    /// Write the built-in H2/STO-3G sample system file
    #[command(name = "sample")]
    Sample {
        /// Where to write the JSON system file
        #[arg(long, short, default_value = "h2_sto3g.json")]
        out: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct ScfOptions {
    /// A JSON system file with the overlap/kinetic/nuclear-attraction
    /// operators, the two-electron tensor, the nuclear repulsion energy and
    /// the electron counts
    #[arg(long, short)]
    system: PathBuf,
    /// Which SCF algorithm to run
    #[arg(long, value_enum, default_value_t = SolverKind::Plain)]
    solver: SolverKind,
    /// The maximum number of iterations before the run is reported as
    /// not converged
    #[arg(long, default_value_t = 128)]
    maxiter: usize,
    /// The convergence threshold (commutator norm for plain, density step
    /// for oda)
    #[arg(long, default_value_t = 1e-8)]
    threshold: f64,
    /// The amount of exact exchange in the Hamiltonian
    #[arg(long, default_value_t = 1.0)]
    exchange_fraction: f64,
    /// Fail when the Hamiltonian would carry no exchange term at all
    #[arg(long)]
    strict: bool,
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let args: Args = Args::parse();
    let (spin, options) = match args.command {
        MfCommand::Restricted { options } => (SpinModel::Restricted, options),
        MfCommand::Unrestricted { options } => (SpinModel::Unrestricted, options),
        MfCommand::Sample { out } => {
            let file = File::create(&out)
                .with_context(|| format!("cannot create {}", out.display()))?;
            serde_json::to_writer(file, &meanfield::testing::h2_sto3g())?;
            println!("wrote sample system to {}", out.display());
            return Ok(());
        }
    };

    let file = File::open(&options.system)
        .with_context(|| format!("cannot open system file {}", options.system.display()))?;
    let system: SystemData = serde_json::from_reader(file)
        .with_context(|| format!("cannot parse system file {}", options.system.display()))?;
    system.validate()?;
    log::info!(
        "loaded system: {} basis functions, {} alpha / {} beta electrons",
        system.nbasis(),
        system.nalpha,
        system.nbeta
    );

    let mut builder = HamiltonianBuilder::new(spin)
        .external(system.nuclear_repulsion)
        .strict(options.strict)
        .auto_complete(
            &system.kinetic,
            &system.nuclear_attraction,
            &system.electron_repulsion,
        );
    if options.exchange_fraction != 0.0 {
        builder = builder.term(Term::Exchange(ExchangeTerm::with_fraction(
            &system.electron_repulsion,
            options.exchange_fraction,
            "x_hf",
        )));
    }
    let mut ham = builder.build()?;

    let n = system.nbasis();
    let mut orbs = vec![Orbitals::new(n, n); spin.ndm()];
    guess_core_hamiltonian(&system.overlap, &system.core_hamiltonian(), &mut orbs)?;
    let occ_model = OccupationModel::aufbau(system.nalpha, system.nbeta)?;
    occ_model.assign(&mut orbs)?;

    let start = Instant::now();
    let outcome = match options.solver {
        SolverKind::Plain => PlainScfSolver::new(options.threshold, Some(options.maxiter)).solve(
            &mut ham,
            &system.overlap,
            &occ_model,
            &mut orbs,
        )?,
        SolverKind::Oda => {
            let mut dms: Vec<DMatrix<f64>> = orbs.iter().map(Orbitals::to_dm).collect();
            let outcome = OdaScfSolver::new(options.threshold, Some(options.maxiter)).solve(
                &mut ham,
                &system.overlap,
                &occ_model,
                &mut dms,
            )?;
            // recover the final expansions from the converged Fock operators
            let mut focks = vec![DMatrix::zeros(n, n); spin.ndm()];
            ham.compute_fock(&mut focks)?;
            for (orb, fock) in orbs.iter_mut().zip(&focks) {
                *orb = Orbitals::from_fock(fock, &system.overlap)?;
            }
            occ_model.assign(&mut orbs)?;
            outcome
        }
    };
    let elapsed = start.elapsed();

    let ScfConvergence {
        converged,
        iterations,
        residual,
    } = outcome;
    if !converged {
        anyhow::bail!(
            "scf did not converge after {iterations} iterations (residual {residual:.3e}); \
             retry with a larger --maxiter or --solver oda"
        );
    }

    println!("scf converged after {iterations} iterations and {elapsed:0.2?}");
    print_report(&mut ham, &orbs)?;
    Ok(())
}

fn print_report(ham: &mut EffectiveHamiltonian, orbs: &[Orbitals]) -> anyhow::Result<()> {
    let total = ham.compute_energy()?;

    println!("total energy: {total:+.10}");
    let mut labels: Vec<&str> = ham
        .cache()
        .keys()
        .filter_map(|key| key.strip_prefix("energy_"))
        .collect();
    labels.sort_unstable();
    for label in labels {
        if let Some(energy) = ham.energy_term(label) {
            println!("  {label:<16} {energy:+.10}");
        }
    }

    for (orb, channel) in orbs.iter().zip(["alpha", "beta"]) {
        println!(
            "{channel} orbital energies: {:.6?}",
            orb.energies.as_slice()
        );
    }
    Ok(())
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SolverKind {
    Plain,
    Oda,
}
