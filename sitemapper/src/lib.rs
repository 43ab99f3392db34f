pub mod commands;
pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{
    RemoteTarget, RunPlan, Strategy, parse_menu_choice, parse_output_format, parse_template,
    parse_yes_no, plan_from_matches, plan_from_prompts, run_plan,
};
