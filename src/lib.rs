pub mod app;
pub mod constants;
pub mod errors;

pub mod managers {
    pub mod checker;
    pub mod ssh;
}

pub mod services {
    pub mod catalog;
    pub mod change_record;
    pub mod device;
    pub mod logger;
    pub mod report;
    pub mod result_log;
    pub mod settings;
}

pub mod utils {
    pub mod paths;
    pub mod text;
    pub mod version;
}
