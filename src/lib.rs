pub mod core {
    pub mod config;
    pub mod error;
    pub mod orchestrator;
    pub mod tracing_init;
}

pub mod models {
    pub mod frame;
    pub mod user;
}

pub mod api {
    pub mod login;
}

pub mod session {
    pub mod reader;
    pub mod sequencer;
    pub mod transport;

    #[cfg(test)]
    pub(crate) mod scripted;
}

pub mod reconcile {
    pub mod diff;
}

pub mod source {
    pub mod roster;
}

pub mod utils {
    pub mod serial;
}
