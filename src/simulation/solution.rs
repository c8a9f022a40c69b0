//! Solution Module
//!
//! This module provides the integration loop and the data structure it returns.
//!
//! # Key Components
//!
//! - [`solve_ode`]: records the time and state after every accepted integrator step
//! - [`Solution`]: the recorded trajectory together with the species order of the state
//! - [`SolveStatus`]: whether the integration reached the end of the time span
//! - [`TimeSeriesMapping`]: species name → trajectory view of a solution

use std::collections::HashMap;

use log::{debug, warn};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::error::SimulationError;
use super::integrator::Integrator;

/// Species name → concentration values over time
pub type TimeSeriesMapping = HashMap<String, Vec<f64>>;

/// Outcome of an integration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SolveStatus {
    /// The end of the time span was reached
    Completed,
    /// The integrator failed at time `t`; the trajectory ends at the last accepted step
    StoppedEarly { t: f64, reason: String },
}

/// Trajectory of a kinetic model
///
/// # Fields
///
/// * `time` - Time points of the accepted integrator steps, starting with `t0`
/// * `species` - Species names in state vector order
/// * `states` - State vector at every time point
/// * `status` - Whether the integration completed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub time: Vec<f64>,
    pub species: Vec<String>,
    pub states: Vec<Vec<f64>>,
    pub status: SolveStatus,
}

impl Solution {
    pub fn new(
        time: Vec<f64>,
        species: Vec<String>,
        states: Vec<Vec<f64>>,
        status: SolveStatus,
    ) -> Self {
        Self {
            time,
            species,
            states,
            status,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == SolveStatus::Completed
    }

    /// Concentration of one species over time
    pub fn species_trajectory(&self, species: &str) -> Option<Vec<f64>> {
        let index = self.species.iter().position(|name| name == species)?;
        Some(self.states.iter().map(|state| state[index]).collect())
    }

    /// State at the last recorded time point
    pub fn final_state(&self) -> Option<&[f64]> {
        self.states.last().map(Vec::as_slice)
    }

    /// Final concentration of one species
    pub fn final_value(&self, species: &str) -> Option<f64> {
        let index = self.species.iter().position(|name| name == species)?;
        self.final_state().map(|state| state[index])
    }

    /// Trajectory as a `(time points × species)` matrix
    pub fn to_matrix(&self) -> Array2<f64> {
        let n_species = self.species.len();
        Array2::from_shape_fn((self.states.len(), n_species), |(row, column)| {
            self.states[row][column]
        })
    }

    /// Trajectory keyed by species name
    pub fn to_time_series(&self) -> TimeSeriesMapping {
        self.species
            .iter()
            .enumerate()
            .map(|(index, name)| {
                (
                    name.clone(),
                    self.states.iter().map(|state| state[index]).collect(),
                )
            })
            .collect()
    }
}

/// Integrates from `t0` to `t1`, recording `(t, y)` after every accepted step
///
/// The initial point is recorded first. If the integrator fails, the trajectory recorded so
/// far is returned with [`SolveStatus::StoppedEarly`].
///
/// # Errors
///
/// Returns [`SimulationError::InvalidTimeSpan`] unless `t0 < t1` and both are finite, and
/// [`SimulationError::StateDimensionMismatch`] if `y0` does not fit the system.
pub fn solve_ode(
    integrator: &mut Integrator<'_>,
    (t0, t1): (f64, f64),
    y0: Vec<f64>,
) -> Result<(Vec<f64>, Vec<Vec<f64>>, SolveStatus), SimulationError> {
    if !(t0.is_finite() && t1.is_finite() && t0 < t1) {
        return Err(SimulationError::InvalidTimeSpan { t0, t1 });
    }

    integrator.set_initial_value(y0, t0)?;

    let mut time = vec![integrator.t()];
    let mut states = vec![integrator.y().to_vec()];

    while integrator.successful() && integrator.t() < t1 {
        if integrator.integrate(t1, true) {
            time.push(integrator.t());
            states.push(integrator.y().to_vec());
        }
    }

    let status = match integrator.failure() {
        None => SolveStatus::Completed,
        Some(failure) => {
            warn!(
                "Integration stopped at t = {} before reaching t1 = {}: {}",
                integrator.t(),
                t1,
                failure
            );
            SolveStatus::StoppedEarly {
                t: integrator.t(),
                reason: failure.to_string(),
            }
        }
    };

    debug!("Recorded {} time points", time.len());

    Ok((time, states, status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    fn solution() -> Solution {
        Solution::new(
            vec![0.0, 1.0, 2.0],
            vec!["A".to_string(), "B".to_string()],
            vec![vec![1.0, 0.0], vec![0.5, 0.5], vec![0.25, 0.75]],
            SolveStatus::Completed,
        )
    }

    #[test]
    fn test_species_trajectory() {
        let solution = solution();

        assert_eq!(solution.species_trajectory("B"), Some(vec![0.0, 0.5, 0.75]));
        assert_eq!(solution.species_trajectory("C"), None);
        assert_relative_eq!(solution.final_value("A").unwrap(), 0.25);
    }

    #[test]
    fn test_to_matrix() {
        let matrix = solution().to_matrix();

        assert_eq!(matrix.shape(), &[3, 2]);
        assert_relative_eq!(matrix[[1, 1]], 0.5);
    }

    #[test]
    fn test_to_time_series() {
        let series = solution().to_time_series();

        assert_eq!(series["A"], vec![1.0, 0.5, 0.25]);
    }

    #[test]
    fn test_status_serialization() {
        let status = SolveStatus::StoppedEarly {
            t: 1.5,
            reason: "Maximum number of steps (3) exceeded".to_string(),
        };
        let json = serde_json::to_value(&status).unwrap();

        assert_eq!(json["status"], "stopped_early");
        assert_eq!(json["t"], 1.5);
    }
}
