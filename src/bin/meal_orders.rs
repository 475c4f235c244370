use std::process::ExitCode;

fn main() -> ExitCode {
    meal_orders_lib::run()
}
