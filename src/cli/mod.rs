pub mod connectivity;
pub mod outputformatter;
