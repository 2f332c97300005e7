//! Print the branchpoint of the current branch.
//!
//! The branchpoint is the latest commit shared with the upstream branch,
//! which is the right base for `git diff` or `git rebase -i` over all
//! pending work.

use crate::branch;
use crate::error::Result;
use crate::session::Session;

pub fn cmd_branchpoint() -> Result<()> {
    let session = Session::from_cwd()?;
    println!("{}", branchpoint(&session)?);
    Ok(())
}

pub fn branchpoint(session: &Session) -> Result<String> {
    let mut b = branch::current_branch(session)?;
    b.need_upstream(session, "branchpoint")?;
    b.branchpoint(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git;
    use crate::test_support::{add_commit, create_server_client};

    #[test]
    fn branchpoint_is_the_base_under_pending_work() {
        let fixture = create_server_client();
        let session = Session::from_dir(&fixture.client).unwrap();
        let base = git::rev_parse(&fixture.client, "HEAD").unwrap();

        add_commit(&fixture.client, "a.txt", "a", "work a");
        add_commit(&fixture.client, "b.txt", "b", "work b");

        assert_eq!(branchpoint(&session).unwrap(), base);
    }

    #[test]
    fn branchpoint_refuses_detached_head() {
        let fixture = create_server_client();
        git::run_git(&fixture.client, &["checkout", "-q", "HEAD^0"]).unwrap();
        let session = Session::from_dir(&fixture.client).unwrap();

        let err = branchpoint(&session).unwrap_err();
        assert!(err.to_string().contains("cannot branchpoint"));
    }
}
