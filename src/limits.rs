/// Maximum writes per atomic batch — the hosted document store rejects
/// larger commits, so bulk operations are capped before staging anything.
///
/// A bulk delete also stages one room patch per touched room on top of the
/// per-worker deletes, so its effective id ceiling is lower when the
/// workers are housed (down to half of this when every worker vacates a
/// distinct room). An overflow is caught after staging and nothing commits.
pub const MAX_BATCH_OPS: usize = 500;

pub const MAX_NAME_LEN: usize = 200;
pub const MAX_CIN_LEN: usize = 64;
