mod rendition_switching;
mod session_flow;
