mod command;
mod policy;
mod schema;
mod util;

fn main() -> anyhow::Result<()> {
    command::run()
}
