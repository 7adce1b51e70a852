mod fixtures;
mod sandbox;
