pub const SCHEMA: &str = r#"
-- Photos table: one row per ingested upload
CREATE TABLE IF NOT EXISTS photos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT NOT NULL UNIQUE,       -- storage name under the photo root
    original_filename TEXT NOT NULL,     -- name supplied by the client
    description TEXT NOT NULL DEFAULT '',
    storage_path TEXT NOT NULL,
    created_at TEXT NOT NULL,

    -- Geolocation as sent by the client, plus parsed coordinates
    map_data TEXT,
    gps_latitude REAL,
    gps_longitude REAL,

    -- Image metadata after normalization
    width INTEGER,
    height INTEGER,
    sha256_hash TEXT
);

CREATE INDEX IF NOT EXISTS idx_photos_sha256 ON photos(sha256_hash);

-- Sensor readings captured alongside a photo
CREATE TABLE IF NOT EXISTS sensor_readings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    photo_id INTEGER NOT NULL,
    reading_type TEXT NOT NULL,
    data TEXT NOT NULL,
    FOREIGN KEY (photo_id) REFERENCES photos(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_sensor_readings_photo ON sensor_readings(photo_id);
"#;

/// Applied in order after SCHEMA; failures (column already present) are ignored
pub const MIGRATIONS: &[&str] = &[
    // Untouched capture kept next to the annotated file
    "ALTER TABLE photos ADD COLUMN raw_path TEXT",
    // Last time the description was (re)computed
    "ALTER TABLE photos ADD COLUMN described_at TEXT",
];
