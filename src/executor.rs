//! Bounded fan-out over a batch of targets.
//!
//! Every input target gets exactly one outcome, in input order; a target's
//! failure never aborts its siblings. A singleton batch runs inline on the
//! calling thread.

use crate::panos::QueryError;
use log::debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

/// Upper bound on concurrent queries. Deliberately small and fixed: the
/// limit protects the management planes being queried, so it does not grow
/// with batch size.
pub const DEFAULT_PARALLEL: usize = 10;

#[derive(Debug)]
pub struct BatchOptions {
    pub parallelism: usize,
    pub retries: u32,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            parallelism: DEFAULT_PARALLEL,
            retries: 0,
        }
    }
}

/// Per-target result, keyed by the target it came from.
#[derive(Debug)]
pub struct TargetOutcome<T> {
    pub target: String,
    pub result: Result<T, QueryError>,
}

/// Runs `query` once per target and collects one outcome per target, in
/// input order. Targets beyond the first run on a pool of worker threads
/// bounded by `opts.parallelism`; per-target errors are captured in the
/// outcome rather than propagated.
pub fn run_batch<T, F>(targets: &[String], opts: &BatchOptions, query: F) -> Vec<TargetOutcome<T>>
where
    T: Send,
    F: Fn(&str) -> Result<T, QueryError> + Sync,
{
    let attempt = |target: &str| {
        let mut result = query(target);
        for retry in 1..=opts.retries {
            if result.is_ok() {
                break;
            }
            debug!("retrying {target} (attempt {})", retry + 1);
            result = query(target);
        }
        result
    };

    if targets.len() <= 1 {
        return targets
            .iter()
            .map(|target| TargetOutcome {
                target: target.clone(),
                result: attempt(target),
            })
            .collect();
    }

    let workers = opts.parallelism.clamp(1, targets.len());
    let next = AtomicUsize::new(0);
    let (tx, rx) = mpsc::channel();

    let mut slots: Vec<Option<Result<T, QueryError>>> = Vec::new();
    slots.resize_with(targets.len(), || None);

    thread::scope(|scope| {
        for _ in 0..workers {
            let tx = tx.clone();
            let next = &next;
            let attempt = &attempt;
            scope.spawn(move || {
                loop {
                    let idx = next.fetch_add(1, Ordering::Relaxed);
                    if idx >= targets.len() {
                        break;
                    }
                    if tx.send((idx, attempt(&targets[idx]))).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        // Ends once every worker has dropped its sender, so a panicking
        // worker leaves holes instead of a hang.
        for (idx, result) in rx {
            slots[idx] = Some(result);
        }
    });

    targets
        .iter()
        .zip(slots)
        .map(|(target, slot)| TargetOutcome {
            target: target.clone(),
            result: slot
                .unwrap_or_else(|| Err(QueryError::Network("query worker died".to_string()))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    fn targets(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn one_outcome_per_target_in_input_order() {
        let batch = targets(&["fw3", "fw1", "fw2", "fw4", "fw5"]);
        let outcomes = run_batch(&batch, &BatchOptions::default(), |host| {
            Ok(host.to_uppercase())
        });

        assert_eq!(outcomes.len(), batch.len());
        let order: Vec<&str> = outcomes.iter().map(|o| o.target.as_str()).collect();
        assert_eq!(order, vec!["fw3", "fw1", "fw2", "fw4", "fw5"]);
        for outcome in &outcomes {
            assert_eq!(
                outcome.result.as_ref().unwrap(),
                &outcome.target.to_uppercase()
            );
        }
    }

    #[test]
    fn singleton_and_batch_agree_for_the_same_target() {
        let query = |host: &str| -> Result<String, QueryError> {
            match host {
                "fw1" => Ok("record".to_string()),
                _ => Err(QueryError::Network("unreachable".to_string())),
            }
        };

        let single = run_batch(&targets(&["fw1"]), &BatchOptions::default(), query);
        let batch = run_batch(&targets(&["fw0", "fw1", "fw2"]), &BatchOptions::default(), query);

        let single_fw1 = single[0].result.as_ref().unwrap();
        let batch_fw1 = batch[1].result.as_ref().unwrap();
        assert_eq!(single_fw1, batch_fw1);
    }

    #[test]
    fn one_failure_does_not_abort_the_batch() {
        let batch = targets(&["fw1", "fw2", "fw3"]);
        let outcomes = run_batch(&batch, &BatchOptions::default(), |host| {
            if host == "fw2" {
                Err(QueryError::Network("connection timed out".to_string()))
            } else {
                Ok(())
            }
        });

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].result.is_ok());
        assert!(outcomes[1].result.is_err());
        assert!(outcomes[2].result.is_ok());
        assert_eq!(outcomes[1].target, "fw2");
    }

    #[test]
    fn every_target_is_queried_exactly_once() {
        let seen = Mutex::new(Vec::new());
        let batch = targets(&["a", "b", "c", "d", "e", "f", "g", "h"]);
        let opts = BatchOptions {
            parallelism: 3,
            retries: 0,
        };
        run_batch(&batch, &opts, |host| {
            seen.lock().unwrap().push(host.to_string());
            Ok(())
        });

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), batch.len());
        let unique: HashSet<&String> = seen.iter().collect();
        assert_eq!(unique.len(), batch.len());
    }

    #[test]
    fn retries_reissue_the_query_before_recording_failure() {
        let calls = Mutex::new(0u32);
        let opts = BatchOptions {
            parallelism: 1,
            retries: 2,
        };
        let outcomes = run_batch(&targets(&["fw1"]), &opts, |_| {
            let mut calls = calls.lock().unwrap();
            *calls += 1;
            if *calls < 3 {
                Err(QueryError::Network("flaky".to_string()))
            } else {
                Ok(*calls)
            }
        });

        assert_eq!(*outcomes[0].result.as_ref().unwrap(), 3);
    }

    #[test]
    fn failures_are_not_retried_by_default() {
        let calls = Mutex::new(0u32);
        let outcomes = run_batch(
            &targets(&["fw1"]),
            &BatchOptions::default(),
            |_| -> Result<(), QueryError> {
                *calls.lock().unwrap() += 1;
                Err(QueryError::Network("down".to_string()))
            },
        );

        assert!(outcomes[0].result.is_err());
        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
