use std::{collections::HashMap, error::Error};

use criterion::{criterion_group, criterion_main, Criterion};
use nalgebra::Vector3;
use xtp_core::{
    atom::Atom,
    basis::{AoBasis, AtomicBasis, BasisFunction, BasisSet, ElectronShell, ShellType},
    config::ConfigBasisSet,
    integrals::{
        coulomb_metric, kinetic_matrix, nuclear_matrix, overlap_matrix, ElectronTensor,
        McMurchieDavidson, ThreeCenter,
    },
    periodic_table::ElementType,
};

const H_6_31G: &str = r#"{"elements":{"1":{"electron_shells":[{"function_type":"gto","angular_momentum":[0],"exponents":["0.1873113696E+02","0.2825394365E+01","0.6401216923E+00"],"coefficients":[["0.3349460434E-01","0.2347269535E+00","0.8137573261E+00"]]},{"function_type":"gto","angular_momentum":[0],"exponents":["0.1612777588E+00"],"coefficients":[["1.0000000"]]}]}},"name":"6-31G"}"#;

const INTEGRATOR: McMurchieDavidson = McMurchieDavidson;

struct Instance {
    name: String,
    atoms: Vec<Atom>,
    basis: Vec<BasisFunction>,
    auxiliary: Vec<BasisFunction>,
}

/// Linear hydrogen chain with 1.4 Bohr spacing.
fn hydrogen_chain(length: usize) -> Result<Instance, Box<dyn Error>> {
    let atoms = (0..length)
        .map(|i| Atom::new(ElementType::H, Vector3::new(0.0, 0.0, 1.4 * i as f64)))
        .collect::<Vec<_>>();

    let basis_set = BasisSet::try_from(serde_json::from_str::<ConfigBasisSet>(H_6_31G)?)?;

    let mut hydrogen = AtomicBasis::empty();
    for exponent in [8.0, 2.0, 0.5, 0.125] {
        hydrogen.push(ElectronShell::new(ShellType::parse("S")?, vec![exponent], vec![vec![1.0]])?);
    }
    hydrogen.push(ElectronShell::new(ShellType::parse("P")?, vec![1.0], vec![vec![1.0]])?);
    let auxiliary_set = BasisSet::new("aux", HashMap::from([(ElementType::H, hydrogen)]));

    Ok(Instance {
        name: format!("H{length} 6-31G"),
        basis: AoBasis::fill(&basis_set, &atoms, None)?.basis_functions()?,
        auxiliary: AoBasis::fill(&auxiliary_set, &atoms, None)?.basis_functions()?,
        atoms,
    })
}

fn bench_one_electron(c: &mut Criterion, instances: &[Instance]) {
    for instance in instances {
        let basis = &instance.basis;
        c.bench_function(&format!("Overlap {}", instance.name), move |b| {
            b.iter(|| overlap_matrix(basis, &INTEGRATOR))
        });
        c.bench_function(&format!("Kinetic {}", instance.name), move |b| {
            b.iter(|| kinetic_matrix(basis, &INTEGRATOR))
        });
        let atoms = &instance.atoms;
        c.bench_function(&format!("Nuclear {}", instance.name), move |b| {
            b.iter(|| nuclear_matrix(basis, atoms, &INTEGRATOR))
        });
    }
}

fn bench_electron(c: &mut Criterion, instances: &[Instance]) {
    for instance in instances {
        let basis = &instance.basis;
        c.bench_function(&format!("Electron Repulsion {}", instance.name), move |b| {
            b.iter(|| ElectronTensor::from_basis(basis, &INTEGRATOR))
        });
    }
}

fn bench_three_center(c: &mut Criterion, instances: &[Instance]) {
    for instance in instances {
        let (basis, auxiliary) = (&instance.basis, &instance.auxiliary);
        c.bench_function(&format!("Coulomb metric {}", instance.name), move |b| {
            b.iter(|| coulomb_metric(auxiliary, &INTEGRATOR))
        });
        c.bench_function(&format!("Three centre {}", instance.name), move |b| {
            b.iter(|| ThreeCenter::from_basis(auxiliary, basis, &INTEGRATOR))
        });
    }
}

fn bench_integrals(c: &mut Criterion) {
    let instances = [2, 4, 8]
        .into_iter()
        .map(hydrogen_chain)
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    bench_one_electron(c, &instances);
    bench_electron(c, &instances[..2]);
    bench_three_center(c, &instances);
}

criterion_group!(benches, bench_integrals);
criterion_main!(benches);
