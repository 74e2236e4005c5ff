mod machine;
mod state_machine;
