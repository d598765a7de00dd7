//! Event declarations of the reserve network contracts.
//!
//! Only events consumed by the crawler are declared. Each protocol version
//! gets its own module so decoders of different versions can coexist in one
//! [`crate::decoder::DecoderRegistry`].

#[allow(clippy::too_many_arguments)]
pub mod katalyst {
    alloy::sol!(
        /// Emitted by the network contract once per executed trade.
        #[derive(Debug, PartialEq, Eq)]
        event KyberTrade(
            address indexed src,
            address indexed dest,
            uint256 ethWeiValue,
            uint256 networkFeeWei,
            uint256 customPlatformFeeWei,
            bytes32[] t2eIds,
            bytes32[] e2tIds,
            uint256[] t2eSrcAmounts,
            uint256[] e2tSrcAmounts,
            uint256[] t2eRates,
            uint256[] e2tRates
        );

        /// Emitted by the fee handler when trade fees are split.
        #[derive(Debug, PartialEq, Eq)]
        event FeeDistributed(
            address indexed token,
            address indexed platformWallet,
            uint256 platformFeeWei,
            uint256 rewardWei,
            uint256 rebateWei,
            address[] rebateWallets,
            uint256[] rebatePercentBpsPerWallet,
            uint256 burnAmtWei
        );

        /// Emitted by the storage contract when a reserve is listed or delisted.
        #[derive(Debug, PartialEq, Eq)]
        event AddReserveToStorage(
            address indexed reserve,
            bytes32 indexed reserveId,
            uint8 reserveType,
            address indexed rebateWallet,
            bool add
        );

        /// Emitted by the storage contract when a reserve's rebate wallet changes.
        #[derive(Debug, PartialEq, Eq)]
        event ReserveRebateWalletSet(bytes32 indexed reserveId, address indexed rebateWallet);
    );
}
