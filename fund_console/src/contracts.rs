//! `sol!`-generated bindings for the externally-deployed fund protocol
//! contracts. Method and event shapes are owned by those deployments, not by
//! this crate.

use alloy::sol;

sol! {
    #[sol(rpc)]
    interface IAccounting {
        struct AccountingState {
            uint256 aumValue;
            uint256 periodBeginningBlock;
            uint256 periodBeginningSupply;
            uint256 theoreticalSupply;
        }

        function getManagementFee() external view returns (uint256);
        function getEvaluationPeriodBlocks() external view returns (uint256);
        function getFundTokenPrice() external view returns (uint256 price, uint256 priceBlock);
        function getState() external view returns (AccountingState state);
    }

    #[sol(rpc)]
    interface IFrontOffice {
        struct RequestAccessor {
            bool isDeposit;
            address token;
            uint256 queueNumber;
        }

        struct Request {
            address user;
            uint256 amountIn;
            uint256 minAmountOut;
            uint256 blockDeadline;
            address incentive;
            uint8 status;
            uint256 blockUpdated;
            uint256 computedAmountOut;
            bool isReclaimed;
        }

        event RequestCreated(address indexed user, RequestAccessor accessor, Request request);
        event RequestReclaimed(address indexed user, RequestAccessor accessor);

        function getUserRequestCount(address user) external view returns (uint256);
        function getUserRequestByIndex(address user, uint256 index)
            external
            view
            returns (RequestAccessor accessor, Request request);
        function requestDeposit(
            address token,
            uint256 amountIn,
            uint256 minAmountOut,
            uint256 blockDeadline,
            address incentive
        ) external;
        function requestWithdrawal(
            address token,
            uint256 amountIn,
            uint256 minAmountOut,
            uint256 blockDeadline
        ) external;
        function cancelLatestRequest() external;
        function reclaimFromFailedRequest(uint256 index) external;
    }

    #[sol(rpc)]
    interface IFrontOfficeParameters {
        function getAllowedTokens() external view returns (address[] memory);
        function getAllowedTokenOracle(address token) external view returns (address);
        function getMaxSingleWithdrawalFundTokenAmount() external view returns (uint256);
    }

    #[sol(rpc)]
    interface IIncentivesManager {
        function getIncentives() external view returns (address[] memory);
    }

    #[sol(rpc)]
    interface IIncentive {
        event UserQualified(address indexed user);

        function getName() external view returns (string memory);
        function checkUserQualifies(address user) external view returns (bool);
    }

    #[sol(rpc)]
    interface IReferralIncentive {
        function register(address referrer) external;
        function getUser(address user)
            external
            view
            returns (address referrer, address[] memory referees);
    }

    #[sol(rpc)]
    interface IERC20 {
        event Transfer(address indexed from, address indexed to, uint256 value);
        event Approval(address indexed owner, address indexed spender, uint256 value);

        function name() external view returns (string memory);
        function symbol() external view returns (string memory);
        function decimals() external view returns (uint8);
        function totalSupply() external view returns (uint256);
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 value) external returns (bool);
    }

    #[sol(rpc)]
    interface IChainlinkOracle {
        function decimals() external view returns (uint8);
        function latestAnswer() external view returns (int256);
    }
}
