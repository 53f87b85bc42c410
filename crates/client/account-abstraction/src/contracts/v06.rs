//! EntryPoint v0.6 Contract Definitions
//!
//! Interfaces of every contract that takes part in the validation phase of a
//! v0.6 UserOperation. The `abi` modules generated here feed the selector
//! registry used to decode traced calls.

use alloy_primitives::Address;
use alloy_sol_types::sol;

/// EntryPoint v0.6 address
pub const ENTRYPOINT_V06_ADDRESS: Address =
    alloy_primitives::address!("5FF137D4b0FDCD49DcA30c7CF57E578a026d2789");

sol! {
    /// UserOperation struct for EntryPoint v0.6
    #[derive(Debug, Default)]
    struct UserOperationV06Packed {
        address sender;
        uint256 nonce;
        bytes initCode;
        bytes callData;
        uint256 callGasLimit;
        uint256 verificationGasLimit;
        uint256 preVerificationGas;
        uint256 maxFeePerGas;
        uint256 maxPriorityFeePerGas;
        bytes paymasterAndData;
        bytes signature;
    }

    /// Return info from simulateValidation
    #[derive(Debug)]
    struct ReturnInfoV06 {
        uint256 preOpGas;
        uint256 prefund;
        bool sigFailed;
        uint48 validAfter;
        uint48 validUntil;
        bytes paymasterContext;
    }

    /// Stake info reported per entity by simulateValidation
    #[derive(Debug)]
    struct StakeInfoV06 {
        uint256 stake;
        uint256 unstakeDelaySec;
    }

    /// Deposit info returned by getDepositInfo
    #[derive(Debug, Default)]
    struct DepositInfoV06 {
        uint112 deposit;
        bool staked;
        uint112 stake;
        uint32 unstakeDelaySec;
        uint48 withdrawTime;
    }

    /// EntryPoint v0.6 interface
    #[sol(abi)]
    interface IEntryPointV06 {
        /// Execute a batch of UserOperations
        function handleOps(UserOperationV06Packed[] calldata ops, address payable beneficiary) external;

        /// Simulate the validation phase, always reverts with the result
        function simulateValidation(UserOperationV06Packed calldata userOp) external;

        /// Simulate a full execution, always reverts with the result
        function simulateHandleOp(
            UserOperationV06Packed calldata op,
            address target,
            bytes calldata targetCallData
        ) external;

        /// Get user operation hash
        function getUserOpHash(UserOperationV06Packed calldata userOp) external view returns (bytes32);

        /// Compute the counterfactual sender address, reverts with SenderAddressResult
        function getSenderAddress(bytes memory initCode) external;

        /// Next nonce for a sender and key
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce);

        /// Revert reason for failed validation/execution
        error FailedOp(uint256 opIndex, string reason);

        /// Aggregator signature check failed
        error SignatureValidationFailed(address aggregator);

        /// Result of getSenderAddress
        error SenderAddressResult(address sender);

        /// Result of simulateValidation
        error ValidationResult(
            ReturnInfoV06 returnInfo,
            StakeInfoV06 senderInfo,
            StakeInfoV06 factoryInfo,
            StakeInfoV06 paymasterInfo
        );

        /// Result of simulateHandleOp
        error ExecutionResult(
            uint256 preOpGas,
            uint256 paid,
            uint48 validAfter,
            uint48 validUntil,
            bool targetSuccess,
            bytes targetResult
        );
    }

    /// Stake and deposit management, part of the EntryPoint
    #[sol(abi)]
    interface IStakeManagerV06 {
        function depositTo(address account) external payable;
        function addStake(uint32 unstakeDelaySec) external payable;
        function unlockStake() external;
        function withdrawStake(address payable withdrawAddress) external;
        function withdrawTo(address payable withdrawAddress, uint256 withdrawAmount) external;
        function balanceOf(address account) external view returns (uint256);
        function getDepositInfo(address account) external view returns (DepositInfoV06 memory info);
    }

    /// Nonce management, part of the EntryPoint
    #[sol(abi)]
    interface INonceManagerV06 {
        function incrementNonce(uint192 key) external;
    }

    /// Account validation entry
    #[sol(abi)]
    interface IAccountV06 {
        function validateUserOp(
            UserOperationV06Packed calldata userOp,
            bytes32 userOpHash,
            uint256 missingAccountFunds
        ) external returns (uint256 validationData);
    }

    /// Paymaster validation and post-operation callback
    #[sol(abi)]
    interface IPaymasterV06 {
        function validatePaymasterUserOp(
            UserOperationV06Packed calldata userOp,
            bytes32 userOpHash,
            uint256 maxCost
        ) external returns (bytes memory context, uint256 validationData);

        function postOp(uint8 mode, bytes calldata context, uint256 actualGasCost) external;
    }

    /// Helper contract the EntryPoint uses to run the factory call
    #[sol(abi)]
    interface ISenderCreatorV06 {
        function createSender(bytes calldata initCode) external returns (address sender);
    }

    /// Errors emitted by the Solidity compiler itself
    #[sol(abi)]
    interface ISolidityErrors {
        error Error(string message);
        error Panic(uint256 code);
    }
}
