use super::types::Policy;

pub(super) fn default_policy() -> Policy {
    Policy::Generations
}

pub(super) fn default_keep() -> u32 {
    90
}

pub(super) fn default_remote_user() -> String {
    "backup".to_string()
}

pub(super) fn default_rsync_binary() -> String {
    "rsync".to_string()
}

pub(super) fn default_dump_extension() -> String {
    "sql.gz".to_string()
}
