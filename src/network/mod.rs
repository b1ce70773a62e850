// Network module
//
// Transport used to reach peer nodes

pub mod fetcher;

pub use fetcher::HttpChainFetcher;
