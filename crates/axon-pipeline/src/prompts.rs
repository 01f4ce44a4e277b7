//! Prompt templates for each pipeline stage. Every template opens with a role
//! sentence unique to its stage.

pub const ANALYSIS_ROLE: &str = "You are a database schema analyst.";
pub const PLAN_ROLE: &str = "You are a database migration strategist.";
pub const TRANSFORM_ROLE: &str = "Act as an expert database architect.";
pub const VALIDATION_ROLE: &str = "You are a data quality assurance expert.";
pub const OPTIMIZATION_ROLE: &str = "You are an expert database performance tuning specialist.";

/// Stands in for the DDL when the transform stage produced none.
pub const MISSING_DDL_NOTE: &str = "-- No DDL was generated in this run.";

fn context_block(context: &str) -> String {
    format!("CONTEXT FROM PREVIOUS RUN:\n---\n{context}\n---")
}

#[must_use]
pub fn analysis_prompt(schema_json: &str, context: &str) -> String {
    format!(
        r#"{ANALYSIS_ROLE} Analyze the database schema provided below. Based on the table and column names, provide a structured analysis in JSON format.

The JSON output should strictly follow this structure:
{{
  "summary": "A brief, one-sentence summary of the database's likely purpose.",
  "key_tables": [
    {{
      "table_name": "string",
      "role": "Fact or Dimension",
      "description": "A short description of this table's purpose."
    }}
  ],
  "relationships": [
    {{
      "from_table": "string",
      "from_column": "string",
      "to_table": "string",
      "to_column": "string",
      "relationship_type": "OneToMany or ManyToOne"
    }}
  ]
}}

Do not include any text or formatting outside of the main JSON object.

{context}

Schema:
```json
{schema_json}
```
"#,
        context = context_block(context),
    )
}

#[must_use]
pub fn plan_prompt(analysis_json: &str, context: &str) -> String {
    format!(
        r"{PLAN_ROLE} Based on the following JSON schema analysis, create a high-level, step-by-step migration plan in Markdown format.

The plan should include the following sections:
- **## 1. Executive Summary**: A brief overview of the migration goals.
- **## 2. Pre-Migration Steps**: Key actions to take before starting, like backups and environment setup.
- **## 3. Migration Sequence**: The recommended order for migrating tables, prioritizing dimension tables before fact tables. Justify your ordering.
- **## 4. Post-Migration Validation**: Steps to verify the migration was successful, such as data validation and integrity checks.

{context}

Here is the schema analysis:
```json
{analysis_json}
```
",
        context = context_block(context),
    )
}

#[must_use]
pub fn transform_prompt(analysis_json: &str, context: &str) -> String {
    format!(
        r"{TRANSFORM_ROLE} Your task is to convert the provided JSON schema analysis into a complete SQL script containing `CREATE TABLE` statements.

Follow these rules:
1.  Generate a `CREATE TABLE` statement for each table identified in the `key_tables` section.
2.  Use standard SQL data types (e.g., `VARCHAR(255)`, `INTEGER`, `TIMESTAMP`).
3.  Define a primary key for each table, typically the `_id` column.
4.  Add comments to the SQL script to explain each table's purpose.
5.  Do not include any text or formatting outside of the SQL code itself.

{context}

Here is the schema analysis:
```json
{analysis_json}
```
",
        context = context_block(context),
    )
}

#[must_use]
pub fn validation_prompt(analysis_json: &str, generated_sql: Option<&str>, context: &str) -> String {
    format!(
        r"{VALIDATION_ROLE} Based on the provided JSON schema analysis and target DDL, generate a SQL script with queries to validate the data after migration.

The script should include:
1.  **Row Count Checks**: For each table, write a commented query to compare the row count between the source and target.
2.  **Null Checks**: For important columns that should not be empty (like IDs and names), write a query to check for NULL values.
3.  **Referential Integrity Checks**: For each relationship identified, write a query to find 'orphan' records in the 'from_table' that don't have a matching record in the 'to_table'.

Use comments extensively to explain the purpose of each validation query.

{context}

SCHEMA ANALYSIS:
```json
{analysis_json}
```

TARGET DDL:
```sql
{ddl}
```
",
        context = context_block(context),
        ddl = generated_sql.unwrap_or(MISSING_DDL_NOTE),
    )
}

#[must_use]
pub fn optimization_prompt(
    analysis_json: &str,
    generated_sql: Option<&str>,
    context: &str,
) -> String {
    format!(
        r"{OPTIMIZATION_ROLE} Review the provided `CREATE TABLE` SQL script and its corresponding schema analysis.

Your task is to generate a new SQL script that provides recommendations for performance optimization. The script should primarily focus on:
1.  **Adding Indexes**: Identify all foreign key columns from the schema analysis and suggest creating indexes on them to speed up join operations.
2.  **General Recommendations**: Add commented-out suggestions for other potential optimizations, such as partitioning large fact tables by date.

Use comments to explain why each index or optimization is beneficial.

{context}

ORIGINAL SCHEMA ANALYSIS:
```json
{analysis_json}
```

GENERATED `CREATE TABLE` SCRIPT:
```sql
{ddl}
```
",
        context = context_block(context),
        ddl = generated_sql.unwrap_or(MISSING_DDL_NOTE),
    )
}
