// src/lib.rs
pub mod ports {
    pub mod binance_futures;
    pub mod paper_dex;
}
pub mod trade {
    pub mod execution {
        pub mod connector_box;
    }
}
pub mod config;
pub mod exchange;
pub mod hedge;
pub mod operator;
pub mod rate_limit_notifier;
