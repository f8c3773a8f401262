use crate::userauth::InfoRequest;

/// An interface answering the `keyboard-interactive` challenges.
pub trait Prompter: Send {
    /// Answer the prompts of the challenge, in order.
    fn respond(&mut self, request: &InfoRequest) -> Vec<String>;
}

impl<T: FnMut(&InfoRequest) -> Vec<String> + Send> Prompter for T {
    fn respond(&mut self, request: &InfoRequest) -> Vec<String> {
        (self)(request)
    }
}
