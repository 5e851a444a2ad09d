mod events;
mod hook;
mod targets;
