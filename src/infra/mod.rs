pub mod caddy;
pub mod cloudflare;
pub mod git;
pub mod http;
pub mod records;
pub mod web;
