mod common;
mod lookup_flow;
