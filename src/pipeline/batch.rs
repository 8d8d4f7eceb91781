use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use super::{ValidateOptions, ValidationResult, Validator};
use crate::mx::LookupMx;
use crate::probe::Connector;

/// Validates `emails` on up to `workers` threads, returning results in input
/// order.
///
/// Workers pull the next index from a shared counter, so a slow mail server
/// only holds up the worker talking to it.
pub fn validate_batch<R, C>(
    validator: &Validator<R, C>,
    emails: &[String],
    options: &ValidateOptions,
    workers: usize,
) -> Vec<ValidationResult>
where
    R: LookupMx + Sync,
    C: Connector + Sync,
{
    if emails.is_empty() {
        return Vec::new();
    }
    let workers = workers.clamp(1, emails.len());
    let next = AtomicUsize::new(0);
    let (tx, rx) = mpsc::channel();

    thread::scope(|scope| {
        for worker in 0..workers {
            let tx = tx.clone();
            let next = &next;
            scope.spawn(move || {
                let _span = tracing::debug_span!("batch_worker", worker).entered();
                loop {
                    let idx = next.fetch_add(1, Ordering::Relaxed);
                    let Some(email) = emails.get(idx) else {
                        break;
                    };
                    if tx.send((idx, validator.validate(email, options))).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(tx);

    let mut slots: Vec<Option<ValidationResult>> = (0..emails.len()).map(|_| None).collect();
    for (idx, result) in rx {
        slots[idx] = Some(result);
    }
    slots.into_iter().flatten().collect()
}
