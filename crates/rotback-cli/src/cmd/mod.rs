pub(crate) mod break_lock;
pub(crate) mod list;
pub(crate) mod rotate;
pub(crate) mod run;
pub(crate) mod sweep;
