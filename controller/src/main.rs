mod host;
mod notify;
mod store;
mod switchbot;
mod weather;

fn main() -> anyhow::Result<()> {
    host::run()
}
