//! Occupation models: how electrons are distributed over an energy-sorted
//! orbital set after each diagonalization.

use crate::error::MeanFieldError;
use crate::orbitals::Orbitals;

/// The closed family of occupation assignment rules.
#[derive(Debug, Clone, PartialEq)]
pub enum OccupationModel {
    /// Fill each spin channel from the bottom of its own energy ladder.
    /// Fractional electron counts occupy the frontier orbital partially.
    Aufbau { nalpha: f64, nbeta: f64 },
    /// Distribute `nel` electrons over both spin channels at once, always
    /// occupying the lowest remaining orbital of either ladder. Requires an
    /// unrestricted expansion pair.
    AufbauSpin { nel: usize },
}

impl OccupationModel {
    pub fn aufbau(nalpha: f64, nbeta: f64) -> Result<Self, MeanFieldError> {
        if nalpha < 0.0 || nbeta < 0.0 {
            return Err(MeanFieldError::ElectronCount(
                "negative electron counts are not allowed".into(),
            ));
        }
        if nalpha == 0.0 && nbeta == 0.0 {
            return Err(MeanFieldError::ElectronCount(
                "at least one alpha or beta electron is required".into(),
            ));
        }
        Ok(Self::Aufbau { nalpha, nbeta })
    }

    pub fn aufbau_spin(nel: usize) -> Result<Self, MeanFieldError> {
        if nel == 0 {
            return Err(MeanFieldError::ElectronCount(
                "the number of electrons must be positive".into(),
            ));
        }
        Ok(Self::AufbauSpin { nel })
    }

    /// Assign occupation numbers to the given expansions (one for a
    /// restricted, two for an unrestricted wavefunction). Energies must be
    /// in non-decreasing order.
    pub fn assign(&self, orbs: &mut [Orbitals]) -> Result<(), MeanFieldError> {
        for orb in orbs.iter() {
            debug_assert!(
                orb.energies.iter().zip(orb.energies.iter().skip(1)).all(|(a, b)| a <= b),
                "orbital energies must be sorted before occupations are assigned"
            );
        }

        match *self {
            Self::Aufbau { nalpha, nbeta } => {
                let both = [nalpha, nbeta];
                let counts = match orbs.len() {
                    1 => &both[..1],
                    2 => &both[..],
                    n => {
                        return Err(MeanFieldError::Unsupported(format!(
                            "the Aufbau model expects 1 or 2 expansions, got {n}"
                        )))
                    }
                };
                for (orb, &nocc) in orbs.iter_mut().zip(counts) {
                    fill_aufbau(orb, nocc)?;
                }
                Ok(())
            }
            Self::AufbauSpin { nel } => {
                let [alpha, beta] = match orbs {
                    [alpha, beta] => [alpha, beta],
                    _ => {
                        return Err(MeanFieldError::Unsupported(
                            "the spin-Aufbau model only applies to unrestricted expansions"
                                .into(),
                        ))
                    }
                };
                fill_aufbau_spin(alpha, beta, nel)
            }
        }
    }
}

fn fill_aufbau(orb: &mut Orbitals, nocc: f64) -> Result<(), MeanFieldError> {
    let norb = orb.norb();
    if nocc > norb as f64 {
        return Err(MeanFieldError::ElectronCount(format!(
            "{nocc} electrons requested but only {norb} orbitals are available"
        )));
    }

    let full = nocc.floor() as usize;
    let fraction = nocc - nocc.floor();
    for i in 0..norb {
        orb.occupations[i] = if i < full { 1.0 } else { 0.0 };
    }
    if fraction > 0.0 {
        orb.occupations[full] = fraction;
    }
    Ok(())
}

fn fill_aufbau_spin(
    alpha: &mut Orbitals,
    beta: &mut Orbitals,
    nel: usize,
) -> Result<(), MeanFieldError> {
    if nel > alpha.norb() + beta.norb() {
        return Err(MeanFieldError::ElectronCount(format!(
            "{nel} electrons requested but only {} spin orbitals are available",
            alpha.norb() + beta.norb()
        )));
    }

    alpha.occupations.fill(0.0);
    beta.occupations.fill(0.0);

    let mut ialpha = 0;
    let mut ibeta = 0;
    for _ in 0..nel {
        let take_alpha = if ialpha == alpha.norb() {
            false
        } else if ibeta == beta.norb() {
            true
        } else {
            alpha.energies[ialpha] <= beta.energies[ibeta]
        };

        if take_alpha {
            alpha.occupations[ialpha] = 1.0;
            ialpha += 1;
        } else {
            beta.occupations[ibeta] = 1.0;
            ibeta += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use nalgebra::DVector;

    use super::*;

    fn ladder(energies: &[f64]) -> Orbitals {
        let mut orb = Orbitals::new(energies.len(), energies.len());
        orb.energies = DVector::from_column_slice(energies);
        orb
    }

    #[test]
    fn rejects_bad_counts() {
        assert!(OccupationModel::aufbau(-1.0, 0.0).is_err());
        assert!(OccupationModel::aufbau(0.0, 0.0).is_err());
        assert!(OccupationModel::aufbau_spin(0).is_err());

        let model = OccupationModel::aufbau(4.0, 0.0).unwrap();
        let mut orbs = [ladder(&[-1.0, 0.0, 1.0])];
        assert!(matches!(
            model.assign(&mut orbs),
            Err(MeanFieldError::ElectronCount(_))
        ));
    }

    #[test]
    fn integer_aufbau_fills_the_bottom() {
        let model = OccupationModel::aufbau(2.0, 1.0).unwrap();
        let mut orbs = [ladder(&[-2.0, -1.0, 0.5]), ladder(&[-1.8, -0.9, 0.6])];
        model.assign(&mut orbs).unwrap();

        assert_eq!(orbs[0].occupations.as_slice(), &[1.0, 1.0, 0.0]);
        assert_eq!(orbs[1].occupations.as_slice(), &[1.0, 0.0, 0.0]);
    }

    #[test]
    fn fractional_aufbau_occupies_the_frontier() {
        let model = OccupationModel::aufbau(1.5, 0.0).unwrap();
        let mut orbs = [ladder(&[-2.0, -1.0, 0.5])];
        model.assign(&mut orbs).unwrap();

        assert_eq!(orbs[0].occupations.as_slice(), &[1.0, 0.5, 0.0]);
    }

    #[test]
    fn spin_aufbau_takes_the_globally_lowest() {
        let model = OccupationModel::aufbau_spin(3).unwrap();
        let mut orbs = [ladder(&[-2.0, -0.5]), ladder(&[-1.0, -0.8])];
        model.assign(&mut orbs).unwrap();

        // -2.0 (alpha), -1.0 (beta), -0.8 (beta)
        assert_eq!(orbs[0].occupations.as_slice(), &[1.0, 0.0]);
        assert_eq!(orbs[1].occupations.as_slice(), &[1.0, 1.0]);
    }

    #[test]
    fn spin_aufbau_requires_two_channels() {
        let model = OccupationModel::aufbau_spin(1).unwrap();
        let mut orbs = [ladder(&[-1.0])];
        assert!(matches!(
            model.assign(&mut orbs),
            Err(MeanFieldError::Unsupported(_))
        ));
    }
}
