pub mod jsonl_tailer;
pub mod udp_listener;

pub use jsonl_tailer::JsonlTailer;
pub use udp_listener::UdpListener;
