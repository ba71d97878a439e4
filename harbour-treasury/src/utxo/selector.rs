use serde::Deserialize;

use crate::{model::UnspentOutput, Error, Result};

/// Input sizing policy for accumulating selections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SelectionPolicy {
    /// Smallest outputs first: clears dust, costs more inputs.
    Small,
    /// Largest first: fewest inputs.
    Big,
    /// Smallest single output covering the target; falls back to `Big`
    /// when no single output is big enough.
    Fitting,
}

/// Stable ordering so identical snapshots select identically: value first,
/// outpoint as tiebreak.
fn sorted(outputs: &[UnspentOutput], descending: bool) -> Vec<UnspentOutput> {
    let mut outputs = outputs.to_vec();
    outputs.sort_by(|a, b| {
        let ord = a
            .value
            .cmp(&b.value)
            .then_with(|| a.txid.cmp(&b.txid))
            .then_with(|| a.vout.cmp(&b.vout));
        if descending {
            ord.reverse()
        } else {
            ord
        }
    });
    outputs
}

/// Exactly one output whose value equals `amount`. Protocol operations that
/// need an exact-value funding output have no other way to satisfy it.
pub fn select_exact(outputs: &[UnspentOutput], amount: i64) -> Result<UnspentOutput> {
    sorted(outputs, false)
        .into_iter()
        .find(|o| o.value == amount)
        .ok_or_else(|| Error::InsufficientFunds {
            address: String::new(),
            needed: amount,
            available: outputs.iter().map(|o| o.value).sum(),
        })
}

/// Accumulates outputs under `policy` until the total covers
/// `amount + fee_buffer`.
pub fn select_until_amount(
    outputs: &[UnspentOutput],
    amount: i64,
    fee_buffer: i64,
    max_inputs: usize,
    policy: SelectionPolicy,
) -> Result<Vec<UnspentOutput>> {
    let target = amount + fee_buffer;

    let candidates = match policy {
        SelectionPolicy::Small => sorted(outputs, false),
        SelectionPolicy::Big => sorted(outputs, true),
        SelectionPolicy::Fitting => {
            let fitting = outputs
                .iter()
                .filter(|o| o.value >= target)
                .cloned()
                .collect::<Vec<_>>();
            if fitting.is_empty() {
                sorted(outputs, true)
            } else {
                return Ok(vec![sorted(&fitting, false).remove(0)]);
            }
        }
    };

    let mut selected = Vec::new();
    let mut total = 0i64;
    for output in candidates {
        total += output.value;
        selected.push(output);
        if total >= target {
            return if selected.len() > max_inputs {
                Err(Error::TooManyInputs(max_inputs))
            } else {
                Ok(selected)
            };
        }
        if selected.len() > max_inputs {
            return Err(Error::TooManyInputs(max_inputs));
        }
    }

    Err(Error::InsufficientFunds {
        address: String::new(),
        needed: target,
        available: total,
    })
}

/// The n smallest or largest outputs with no amount target; consolidation
/// picks its victims this way.
pub fn select_count(
    outputs: &[UnspentOutput],
    count: usize,
    policy: SelectionPolicy,
) -> Vec<UnspentOutput> {
    let descending = !matches!(policy, SelectionPolicy::Small);
    let mut selected = sorted(outputs, descending);
    selected.truncate(count);
    selected
}

#[cfg(test)]
mod tests {
    use bitcoin::{hashes::Hash, ScriptBuf, Txid};

    use super::*;

    fn utxo(tag: u8, value: i64) -> UnspentOutput {
        UnspentOutput {
            txid: Txid::from_byte_array([tag; 32]),
            vout: 0,
            script: ScriptBuf::new(),
            value,
            token_id: 0,
        }
    }

    #[test]
    fn select_exact_boundary() {
        let outputs = vec![utxo(1, 100), utxo(2, 250)];
        assert_eq!(select_exact(&outputs, 100).unwrap().value, 100);
        assert!(matches!(
            select_exact(&outputs, 150),
            Err(Error::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn until_amount_small_takes_dust_first() {
        let outputs = vec![utxo(1, 500), utxo(2, 50), utxo(3, 100)];
        let selected = select_until_amount(&outputs, 120, 0, 10, SelectionPolicy::Small).unwrap();
        assert_eq!(
            selected.iter().map(|o| o.value).collect::<Vec<_>>(),
            vec![50, 100]
        );
    }

    #[test]
    fn until_amount_big_takes_fewest_inputs() {
        let outputs = vec![utxo(1, 500), utxo(2, 50), utxo(3, 100)];
        let selected = select_until_amount(&outputs, 120, 0, 10, SelectionPolicy::Big).unwrap();
        assert_eq!(selected.iter().map(|o| o.value).collect::<Vec<_>>(), vec![500]);
    }

    #[test]
    fn fitting_prefers_smallest_sufficient_output() {
        let outputs = vec![utxo(1, 500), utxo(2, 130), utxo(3, 100)];
        let selected =
            select_until_amount(&outputs, 120, 0, 10, SelectionPolicy::Fitting).unwrap();
        assert_eq!(selected.iter().map(|o| o.value).collect::<Vec<_>>(), vec![130]);
    }

    #[test]
    fn fitting_falls_back_to_big() {
        let outputs = vec![utxo(1, 80), utxo(2, 70)];
        let selected =
            select_until_amount(&outputs, 120, 0, 10, SelectionPolicy::Fitting).unwrap();
        assert_eq!(
            selected.iter().map(|o| o.value).collect::<Vec<_>>(),
            vec![80, 70]
        );
    }

    #[test]
    fn until_amount_respects_fee_buffer_and_reports_shortfall() {
        let outputs = vec![utxo(1, 100)];
        let err = select_until_amount(&outputs, 100, 10, 10, SelectionPolicy::Big).unwrap_err();
        match err {
            Error::InsufficientFunds { needed, available, .. } => {
                assert_eq!(needed, 110);
                assert_eq!(available, 100);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn until_amount_enforces_input_cap() {
        let outputs = (0..10).map(|i| utxo(i, 10)).collect::<Vec<_>>();
        assert!(matches!(
            select_until_amount(&outputs, 95, 0, 5, SelectionPolicy::Small),
            Err(Error::TooManyInputs(5))
        ));
    }

    #[test]
    fn selection_is_idempotent_over_a_snapshot() {
        let outputs = vec![utxo(3, 100), utxo(1, 100), utxo(2, 500), utxo(4, 50)];
        let a = select_until_amount(&outputs, 180, 0, 10, SelectionPolicy::Small).unwrap();
        let b = select_until_amount(&outputs, 180, 0, 10, SelectionPolicy::Small).unwrap();
        assert_eq!(a, b);

        // Shuffled input, same snapshot contents: same result.
        let mut shuffled = outputs.clone();
        shuffled.reverse();
        let c = select_until_amount(&shuffled, 180, 0, 10, SelectionPolicy::Small).unwrap();
        assert_eq!(a, c);
    }

    #[test]
    fn count_selection_takes_n_by_policy() {
        let outputs = vec![utxo(1, 5), utxo(2, 50), utxo(3, 500)];
        let smallest = select_count(&outputs, 2, SelectionPolicy::Small);
        assert_eq!(
            smallest.iter().map(|o| o.value).collect::<Vec<_>>(),
            vec![5, 50]
        );
        let largest = select_count(&outputs, 2, SelectionPolicy::Big);
        assert_eq!(
            largest.iter().map(|o| o.value).collect::<Vec<_>>(),
            vec![500, 50]
        );
    }
}
