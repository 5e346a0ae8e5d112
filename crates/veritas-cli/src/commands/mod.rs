//! Command implementations

pub mod check;
pub mod models;
pub mod run;

use veritas_kernel::VeritasError;

/// Flatten an error-stack report, context chain included, for display.
pub(crate) fn report_to_anyhow(report: error_stack::Report<VeritasError>) -> anyhow::Error {
    anyhow::anyhow!("{report:?}")
}
