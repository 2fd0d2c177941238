//! The interceptor chain (spec §4.10): an ordered list of pre-submission
//! rewrite hooks, with a fixed blacklist protecting user-intent-critical
//! commands from replacement.

use crate::cmd::{Command, CommandKind};

/// Commands a hook is never allowed to replace, regardless of chain order
/// (spec §4.10: "user-intent critical").
const BLACKLIST: &[CommandKind] = &[CommandKind::AddOnion, CommandKind::DelOnion];

/// A single rewrite hook. Returning `None` leaves the command untouched.
pub type Hook = Box<dyn Fn(&Command) -> Option<Command> + Send + Sync>;

/// An ordered chain of [`Hook`]s applied before a command is encoded.
#[derive(Default)]
pub struct InterceptorChain {
    hooks: Vec<Hook>,
}

impl InterceptorChain {
    /// An empty chain.
    pub fn new() -> Self {
        InterceptorChain { hooks: Vec::new() }
    }

    /// Append a hook to the end of the chain.
    pub fn push(&mut self, hook: Hook) {
        self.hooks.push(hook);
    }

    /// Run every hook in order. A hook's rewrite is accepted only if its
    /// kind matches the original and the original command's kind is not
    /// blacklisted; otherwise the command already in hand (not the
    /// attempted rewrite) is carried forward unchanged.
    pub(crate) fn apply(&self, mut cmd: Command) -> Command {
        for hook in &self.hooks {
            if BLACKLIST.contains(&cmd.kind()) {
                continue;
            }
            if let Some(rewritten) = hook(&cmd) {
                if rewritten.kind() == cmd.kind() {
                    cmd = rewritten;
                }
                // A hook that returns a different kind is rejected; `cmd`
                // (the pre-hook command) is kept as-is.
            }
        }
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_rewrites_matching_kind() {
        let mut chain = InterceptorChain::new();
        chain.push(Box::new(|cmd| match cmd {
            Command::Signal { .. } => Some(Command::Signal { name: "HALT".into() }),
            _ => None,
        }));
        let out = chain.apply(Command::Signal { name: "SHUTDOWN".into() });
        match out {
            Command::Signal { name } => assert_eq!(name, "HALT"),
            _ => panic!("wrong kind"),
        }
    }

    #[test]
    fn blacklist_forbids_add_onion_replacement() {
        let mut chain = InterceptorChain::new();
        chain.push(Box::new(|_| {
            Some(Command::DelOnion { address: "evil".into() })
        }));
        let original = Command::AddOnion {
            key_spec: "NEW:BEST".into(),
            flags: vec![],
            max_streams: None,
            ports: vec![],
        };
        let out = chain.apply(original.clone());
        assert_eq!(out.kind(), original.kind());
    }

    #[test]
    fn mismatched_kind_rewrite_is_rejected() {
        let mut chain = InterceptorChain::new();
        chain.push(Box::new(|_| Some(Command::DropGuards)));
        let out = chain.apply(Command::TakeOwnership);
        assert_eq!(out.kind(), CommandKind::TakeOwnership);
    }
}
