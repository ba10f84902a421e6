mod app;
mod dispatch;
mod env;
mod error;
mod fabfile;
mod invocation;
mod settings;

fn main() {
    std::process::exit(app::run());
}
