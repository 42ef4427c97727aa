// data module
pub mod data {
    pub mod feature;
    pub mod tolerance;
    pub mod result;
}

// algorithm module
pub mod algorithm {
    pub mod ordering;
    pub mod grid;
    pub mod window;
    pub mod cluster;
    pub mod adaptive;
    pub mod matcher;
}

// error types
pub mod error;
