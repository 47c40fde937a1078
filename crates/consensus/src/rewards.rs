//! Block subsidy schedule.

use crate::money::Amount;
use crate::params::ConsensusParams;

pub fn block_subsidy(height: u32, params: &ConsensusParams) -> Amount {
    if params.subsidy_halving_interval == 0 {
        return params.initial_subsidy;
    }
    let halvings = height / params.subsidy_halving_interval;
    if halvings >= 64 {
        return 0;
    }
    params.initial_subsidy >> halvings
}

/// Subsidy plus the fees collected by the block's transactions.
pub fn block_value(height: u32, fees: Amount, params: &ConsensusParams) -> Amount {
    block_subsidy(height, params).saturating_add(fees)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::COIN;
    use crate::params::{consensus_params, Network};

    #[test]
    fn subsidy_halves_on_interval() {
        let params = consensus_params(Network::Regtest);
        let interval = params.subsidy_halving_interval;
        assert_eq!(block_subsidy(1, &params), 50 * COIN);
        assert_eq!(block_subsidy(interval - 1, &params), 50 * COIN);
        assert_eq!(block_subsidy(interval, &params), 25 * COIN);
        assert_eq!(block_subsidy(interval * 2, &params), 25 * COIN / 2);
        assert_eq!(block_subsidy(interval * 64, &params), 0);
    }

    #[test]
    fn block_value_adds_fees() {
        let params = consensus_params(Network::Mainnet);
        assert_eq!(block_value(10, 1234, &params), 50 * COIN + 1234);
    }
}
