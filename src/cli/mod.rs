pub mod app;
mod commands;
mod context;
mod dispatch;
mod env;
mod evaluate;
mod gates;
mod registry;
mod replay;
mod runtime;
mod token;
