use std::rc::Rc;

use crate::error::EngineError;
use crate::value::Row;

/// External generative probabilistic model interface (§6 GPM contract).
///
/// Implementations are opaque to the engine and must be pure with respect
/// to it: the engine caches nothing and calls `logpdf`/`simulate` exactly
/// as many times as the compiled plan requires.
pub trait Gpm {
    /// `logpdf(targets, constraints) -> float`.
    fn logpdf(&self, targets: &Row, constraints: &Row) -> Result<f64, EngineError>;

    /// `simulate(targets, constraints) -> row`. `targets` names the
    /// variables to sample; the result row carries exactly those keys.
    fn simulate(&self, targets: &[String], constraints: &Row) -> Result<Row, EngineError>;
}

/// `ConstrainedGPM` (§3): wraps a GPM with a fixed target set and fixed
/// constraints. Composition is always by wrapping, never by mutation, so
/// the wrapped tree is acyclic by construction (§9 Cyclic back-references).
pub struct ConstrainedGpm {
    inner: Rc<dyn Gpm>,
    targets: Vec<String>,
    constraints: Row,
}

impl ConstrainedGpm {
    pub fn new(inner: Rc<dyn Gpm>, targets: Vec<String>, constraints: Row) -> Self {
        ConstrainedGpm { inner, targets, constraints }
    }

    fn effective_targets(&self, t: &[String]) -> Vec<String> {
        if self.targets.is_empty() {
            t.to_vec()
        } else {
            t.iter().filter(|v| self.targets.contains(v)).cloned().collect()
        }
    }
}

impl Gpm for ConstrainedGpm {
    /// `logpdf(G, t, c) = logpdf(M, t ∩ T, C ∪ c)`, `c` winning on key
    /// collision (§8 invariant 3).
    fn logpdf(&self, targets: &Row, constraints: &Row) -> Result<f64, EngineError> {
        let target_keys: Vec<String> = targets.keys().map(String::from).collect();
        let restricted_keys = self.effective_targets(&target_keys);
        let mut restricted = Row::new();
        for key in &restricted_keys {
            if let Some(v) = targets.get(key) {
                restricted.insert(key.clone(), v.clone());
            }
        }
        let merged_constraints = self.constraints.merge(constraints);
        self.inner.logpdf(&restricted, &merged_constraints)
    }

    /// `simulate(G, t, c)` draws over `T ∩ t` with constraints `C ∪ c`.
    fn simulate(&self, targets: &[String], constraints: &Row) -> Result<Row, EngineError> {
        let restricted = self.effective_targets(targets);
        let merged_constraints = self.constraints.merge(constraints);
        self.inner.simulate(&restricted, &merged_constraints)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A deterministic test GPM: `logpdf` and `simulate` are supplied as
    /// closures so scenario tests can pin exact return values (§8 end-to-end
    /// scenarios 5 and 6 require a fixed `logpdf`/`simulate` result).
    pub struct FixedGpm<L, S> {
        pub logpdf_fn: L,
        pub simulate_fn: S,
    }

    impl<L, S> Gpm for FixedGpm<L, S>
    where
        L: Fn(&Row, &Row) -> Result<f64, EngineError>,
        S: Fn(&[String], &Row) -> Result<Row, EngineError>,
    {
        fn logpdf(&self, targets: &Row, constraints: &Row) -> Result<f64, EngineError> {
            (self.logpdf_fn)(targets, constraints)
        }

        fn simulate(&self, targets: &[String], constraints: &Row) -> Result<Row, EngineError> {
            (self.simulate_fn)(targets, constraints)
        }
    }
}

#[cfg(test)]
mod test {
    use super::test_support::FixedGpm;
    use super::*;

    #[test]
    fn constrained_gpm_restricts_targets_and_merges_constraints() {
        let base = FixedGpm {
            logpdf_fn: |targets: &Row, constraints: &Row| {
                assert_eq!(targets.keys().collect::<Vec<_>>(), vec!["x"]);
                assert!(constraints.contains_key("y"));
                assert!(constraints.contains_key("z"));
                Ok(0.5_f64.ln())
            },
            simulate_fn: |_targets: &[String], _constraints: &Row| Ok(Row::new()),
        };

        let mut base_constraints = Row::new();
        base_constraints.insert("y", crate::value::Value::Int(1));

        let gpm = ConstrainedGpm::new(
            Rc::new(base),
            vec!["x".to_string()],
            base_constraints,
        );

        let mut targets = Row::new();
        targets.insert("x", crate::value::Value::Int(1));
        targets.insert("w", crate::value::Value::Int(2));

        let mut call_constraints = Row::new();
        call_constraints.insert("z", crate::value::Value::Int(3));

        let density = gpm.logpdf(&targets, &call_constraints).unwrap();
        assert!((density - 0.5_f64.ln()).abs() < 1e-9);
    }
}
