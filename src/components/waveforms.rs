//! Time-varying source waveforms for transient analysis.
//!
//! A waveform also reports its corners as breakpoints so the transient
//! engine lands on them exactly.

use std::f64::consts::PI;

use crate::error::{NodalError, Result};

/// A time-varying source waveform.
#[derive(Debug, Clone, PartialEq)]
pub enum Waveform {
    /// Pulse waveform: PULSE(V1 V2 TD TR TF PW PER)
    ///
    /// - V1: Initial value
    /// - V2: Pulsed value
    /// - TD: Delay time (before first pulse)
    /// - TR: Rise time
    /// - TF: Fall time
    /// - PW: Pulse width (at V2)
    /// - PER: Period (0 for single pulse)
    Pulse {
        v1: f64,
        v2: f64,
        td: f64,
        tr: f64,
        tf: f64,
        pw: f64,
        per: f64,
    },

    /// Sinusoidal waveform: SIN(VO VA FREQ TD THETA PHASE)
    ///
    /// - VO: Offset
    /// - VA: Amplitude
    /// - FREQ: Frequency in Hz
    /// - TD: Delay time (before sinusoid starts)
    /// - THETA: Damping factor (1/s), 0 for undamped
    /// - PHASE: Phase in degrees
    Sine {
        vo: f64,
        va: f64,
        freq: f64,
        td: f64,
        theta: f64,
        phase: f64,
    },

    /// Piecewise linear waveform: PWL(T1 V1 T2 V2 ...)
    Pwl {
        /// Time-value pairs, strictly increasing in time.
        points: Vec<(f64, f64)>,
    },
}

impl Waveform {
    /// Create a pulse waveform.
    pub fn pulse(v1: f64, v2: f64, td: f64, tr: f64, tf: f64, pw: f64, per: f64) -> Self {
        Waveform::Pulse {
            v1,
            v2,
            td,
            tr,
            tf,
            pw,
            per,
        }
    }

    /// Create an undamped sinusoid starting at time zero.
    pub fn sine(vo: f64, va: f64, freq: f64) -> Self {
        Waveform::Sine {
            vo,
            va,
            freq,
            td: 0.0,
            theta: 0.0,
            phase: 0.0,
        }
    }

    /// Create a sinusoid with every parameter.
    pub fn sine_full(vo: f64, va: f64, freq: f64, td: f64, theta: f64, phase: f64) -> Self {
        Waveform::Sine {
            vo,
            va,
            freq,
            td,
            theta,
            phase,
        }
    }

    /// Create a piecewise linear waveform.
    pub fn pwl(points: Vec<(f64, f64)>) -> Self {
        Waveform::Pwl { points }
    }

    /// Check the waveform parameters.
    pub fn validate(&self, entity: &str) -> Result<()> {
        match self {
            Waveform::Pulse {
                td, tr, tf, pw, per, ..
            } => {
                for (name, value) in [("td", td), ("tr", tr), ("tf", tf), ("pw", pw), ("per", per)]
                {
                    if !(*value >= 0.0 && value.is_finite()) {
                        return Err(NodalError::invalid_parameter(
                            entity,
                            name,
                            format!("must be non-negative, got {}", value),
                        ));
                    }
                }
                if *per > 0.0 && *per < tr + pw + tf {
                    return Err(NodalError::invalid_parameter(
                        entity,
                        "per",
                        "period is shorter than one pulse",
                    ));
                }
            }
            Waveform::Sine { freq, td, .. } => {
                if *freq < 0.0 || *td < 0.0 {
                    return Err(NodalError::invalid_parameter(
                        entity,
                        "sine",
                        "frequency and delay must be non-negative",
                    ));
                }
            }
            Waveform::Pwl { points } => {
                if points.is_empty() {
                    return Err(NodalError::invalid_parameter(
                        entity,
                        "pwl",
                        "at least one point is required",
                    ));
                }
                if points.windows(2).any(|w| w[1].0 <= w[0].0) {
                    return Err(NodalError::invalid_parameter(
                        entity,
                        "pwl",
                        "times must be strictly increasing",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Evaluate the waveform at a given time.
    pub fn value_at(&self, time: f64) -> f64 {
        match self {
            Waveform::Pulse {
                v1,
                v2,
                td,
                tr,
                tf,
                pw,
                per,
            } => eval_pulse(*v1, *v2, *td, *tr, *tf, *pw, *per, time),
            Waveform::Sine {
                vo,
                va,
                freq,
                td,
                theta,
                phase,
            } => eval_sine(*vo, *va, *freq, *td, *theta, *phase, time),
            Waveform::Pwl { points } => eval_pwl(points, time),
        }
    }

    /// Corner times in `(0, final_time]`, sorted.
    pub fn breakpoints(&self, final_time: f64) -> Vec<f64> {
        let mut times = Vec::new();
        match self {
            Waveform::Pulse {
                td, tr, tf, pw, per, ..
            } => {
                let corners = [0.0, *tr, tr + pw, tr + pw + tf];
                let mut start = *td;
                loop {
                    for corner in corners {
                        times.push(start + corner);
                    }
                    if *per <= 0.0 || start + per > final_time {
                        break;
                    }
                    start += per;
                }
            }
            Waveform::Sine { td, .. } => times.push(*td),
            Waveform::Pwl { points } => times.extend(points.iter().map(|&(t, _)| t)),
        }
        times.retain(|&t| t > 0.0 && t <= final_time);
        times.sort_by(f64::total_cmp);
        times.dedup();
        times
    }
}

/// Evaluate a pulse waveform at time t.
#[allow(clippy::too_many_arguments)]
fn eval_pulse(v1: f64, v2: f64, td: f64, tr: f64, tf: f64, pw: f64, per: f64, t: f64) -> f64 {
    if t < td {
        return v1;
    }

    let t_rel = if per > 0.0 { (t - td) % per } else { t - td };

    if t_rel < tr {
        v1 + (v2 - v1) * t_rel / tr
    } else if t_rel < tr + pw {
        v2
    } else if t_rel < tr + pw + tf {
        v2 - (v2 - v1) * (t_rel - tr - pw) / tf
    } else {
        v1
    }
}

/// Evaluate a sinusoidal waveform at time t.
fn eval_sine(vo: f64, va: f64, freq: f64, td: f64, theta: f64, phase: f64, t: f64) -> f64 {
    let phase_rad = phase * PI / 180.0;
    if t < td {
        return vo + va * phase_rad.sin();
    }

    let t_rel = t - td;
    let damping = if theta > 0.0 {
        (-theta * t_rel).exp()
    } else {
        1.0
    };

    vo + va * damping * (2.0 * PI * freq * t_rel + phase_rad).sin()
}

/// Evaluate a piecewise linear waveform at time t.
fn eval_pwl(points: &[(f64, f64)], t: f64) -> f64 {
    let (first, last) = match (points.first(), points.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return 0.0,
    };
    if t <= first.0 {
        return first.1;
    }
    if t >= last.0 {
        return last.1;
    }

    // First point strictly after t
    let upper = points.partition_point(|&(pt, _)| pt <= t);
    let (t0, v0) = points[upper - 1];
    let (t1, v1) = points[upper];
    v0 + (v1 - v0) * (t - t0) / (t1 - t0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pulse_shape() {
        let w = Waveform::pulse(0.0, 5.0, 1e-6, 1e-7, 1e-7, 1e-6, 0.0);
        assert_eq!(w.value_at(0.0), 0.0);
        assert_relative_eq!(w.value_at(1.05e-6), 2.5, epsilon = 1e-9);
        assert_eq!(w.value_at(1.5e-6), 5.0);
        assert_relative_eq!(w.value_at(2.15e-6), 2.5, epsilon = 1e-9);
        assert_eq!(w.value_at(3e-6), 0.0);
    }

    #[test]
    fn test_zero_rise_time_is_a_step() {
        let w = Waveform::pulse(0.0, 1.0, 1e-3, 0.0, 0.0, 1e-3, 0.0);
        assert_eq!(w.value_at(0.999e-3), 0.0);
        assert_eq!(w.value_at(1e-3), 1.0);
        assert!(w.value_at(1.5e-3).is_finite());
    }

    #[test]
    fn test_pulse_breakpoints_repeat_each_period() {
        let w = Waveform::pulse(0.0, 1.0, 1e-6, 1e-9, 1e-9, 1e-6, 4e-6);
        let bps = w.breakpoints(6e-6);
        assert_eq!(bps[0], 1e-6);
        // Second period starts at td + per
        assert!(bps.iter().any(|&t| (t - 5e-6).abs() < 1e-18));
        assert!(bps.iter().all(|&t| t > 0.0 && t <= 6e-6));
        assert!(bps.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_sine_with_delay_and_damping() {
        let w = Waveform::sine_full(1.0, 2.0, 1e3, 1e-3, 100.0, 90.0);
        assert_relative_eq!(w.value_at(0.0), 3.0);
        assert_relative_eq!(w.value_at(1e-3), 3.0);
        let t = 1e-3 + 1e-3;
        assert_relative_eq!(w.value_at(t), 1.0 + 2.0 * (-0.1f64).exp(), epsilon = 1e-9);
        assert_eq!(w.breakpoints(1.0), vec![1e-3]);
    }

    #[test]
    fn test_pwl_interpolation() {
        let w = Waveform::pwl(vec![(0.0, 0.0), (1.0, 2.0), (3.0, -2.0)]);
        assert_eq!(w.value_at(-1.0), 0.0);
        assert_relative_eq!(w.value_at(0.5), 1.0);
        assert_relative_eq!(w.value_at(2.0), 0.0);
        assert_eq!(w.value_at(5.0), -2.0);
        assert_eq!(w.breakpoints(2.0), vec![1.0]);
    }

    #[test]
    fn test_pwl_validation() {
        let w = Waveform::pwl(vec![(0.0, 0.0), (0.0, 1.0)]);
        assert!(matches!(
            w.validate("V1"),
            Err(NodalError::InvalidParameter { .. })
        ));
    }
}
