pub mod api;
pub mod decoders;
pub mod drafts;
pub mod fetcher;
pub mod gmail;
