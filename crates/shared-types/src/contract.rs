//! # Staking Contract Interface
//!
//! Solidity surface of the staking pool and its upkeep contract. Event topics,
//! log decoding and call encoding all come from this one declaration.

use alloy_sol_types::sol;

sol! {
    /// Events and functions the oracle reads or calls.
    #[derive(Debug, PartialEq, Eq)]
    interface IStakingOracle {
        /// User stake entered the pool.
        event StakeDeposited(address indexed staker, uint256 amount);

        /// A validator started earning with `amount` of pooled stake.
        event ValidatorActivated(uint256 indexed validatorId, uint256 amount);

        /// Consensus rewards were swept to the pool.
        event RewardsSwept(uint256 amount);

        /// A validator exited and its balance was swept.
        event ValidatorExited(uint256 indexed validatorId, uint256 amount);

        /// A user asked to withdraw stake.
        event WithdrawalRequested(address indexed staker, uint256 amount);

        /// The oracle callback answered a report request.
        event ReportFulfilled(
            bytes32 requestId,
            uint256 activeStake,
            uint256 sweptRewards,
            uint256 sweptExits
        );

        /// Whether a report is due.
        function checkUpkeep() external view returns (bool upkeepNeeded);

        /// Ask the oracle network for a report keyed by `requestId`.
        function requestReport(
            bytes32 requestId,
            uint256 activeStake,
            uint256 sweptRewards,
            uint256 sweptExits
        ) external;

        /// Submit fulfilled report values keyed by `requestId`.
        function submitReport(
            bytes32 requestId,
            uint256 activeStake,
            uint256 sweptRewards,
            uint256 sweptExits
        ) external;
    }
}
