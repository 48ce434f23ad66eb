use thiserror::Error;

/// The error type for all fallible operations in the `meanfield` library.
///
/// Only genuinely fatal conditions live here: configuration mistakes caught
/// at construction time, internal consistency violations, and configurations
/// no solver recognizes. Running out of SCF iterations is *not* an error —
/// the solvers report it through [`crate::scf::ScfConvergence`] so callers
/// can retry with a different algorithm without unwinding.
#[derive(Error, Debug)]
pub enum MeanFieldError {
    /// A Hamiltonian was constructed with an empty term list.
    #[error("at least one term must be present in the Hamiltonian")]
    EmptyHamiltonian,

    /// Two terms share the same label, which would make their cache entries
    /// and energy report keys collide.
    #[error("duplicate term label '{label}' in the Hamiltonian")]
    DuplicateLabel { label: String },

    /// A grid group was created without any functional terms.
    #[error("grid group '{label}' contains no functional terms")]
    EmptyGridGroup { label: String },

    /// Functional terms were supplied to the builder without a quadrature
    /// grid to evaluate them on.
    #[error("the term '{label}' requires a quadrature grid, but none was supplied")]
    MissingGrid { label: String },

    /// Strict validation is enabled and the Hamiltonian has neither an
    /// exchange term nor a grid group.
    #[error("strict validation: the Hamiltonian contains no exchange or grid term")]
    MissingExchange,

    /// The requested electron count cannot be represented with the available
    /// orbitals (or is otherwise nonsensical, e.g. negative).
    #[error("incompatible electron count: {0}")]
    ElectronCount(String),

    /// A density matrix has eigenvalues (natural occupations) outside the
    /// admissible range `[0, occ_max]`.
    #[error(
        "density matrix eigenvalues outside [0, {occ_max}]: min {min:.6e}, max {max:.6e}"
    )]
    InvalidDensityMatrix { min: f64, max: f64, occ_max: f64 },

    /// The overlap matrix cannot be orthogonalized: an eigenvalue fell below
    /// the numerical threshold, indicating a (near-)linearly dependent basis.
    #[error("overlap matrix is near-singular: eigenvalue {eigenvalue:.6e} below {epsilon:.6e}")]
    SingularOverlap { eigenvalue: f64, epsilon: f64 },

    /// Orbital projection onto a new basis produced a redundant vector: its
    /// norm fell below the threshold during Gram-Schmidt orthogonalization.
    #[error(
        "orbital norm {norm:.6e} fell below {epsilon:.6e} during Gram-Schmidt orthogonalization"
    )]
    ProjectionFailure { norm: f64, epsilon: f64 },

    /// The ODA solver reached its convergence criterion at a point whose
    /// energy gradient along the line search is not negligible. The claimed
    /// solution is not stationary; the wavefunction state is inconsistent.
    #[error("ODA converged at a point with non-negligible energy gradient {gradient:.6e}")]
    GradientAtConvergence { gradient: f64 },

    /// A configuration this library does not implement (wrong number of spin
    /// channels for a solver, dot-hessian of a grid group, ...).
    #[error("unsupported configuration: {0}")]
    Unsupported(String),
}
